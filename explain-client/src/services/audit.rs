//! Audit orchestration over the source-documents and general-ledger jobs.
//!
//! Both start requests are issued concurrently and both are always
//! attempted. Waiting is concurrent as well: the first job to fail ends the
//! audit and the sibling poller is dropped without issuing further polls.

use crate::config::PollingSettings;
use crate::models::{AuditResult, GeneralLedgerResponse, JobName, ParseResponse};
use crate::services::poller::{JobPoller, JobTransport, PollConfig, ProgressFn};
use crate::utils::clock::Clock;
use explain_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AuditOrchestrator {
    transport: Arc<dyn JobTransport>,
    clock: Arc<dyn Clock>,
    polling: PollingSettings,
    cancel: CancellationToken,
}

impl AuditOrchestrator {
    pub fn new(
        transport: Arc<dyn JobTransport>,
        clock: Arc<dyn Clock>,
        polling: PollingSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            clock,
            polling,
            cancel,
        }
    }

    fn poll_config(&self, interval_secs: u64) -> PollConfig {
        PollConfig::new(Duration::from_secs(interval_secs))
            .with_max_attempts(self.polling.max_attempts)
            .with_max_duration(Duration::from_secs(self.polling.max_duration_secs))
    }

    fn poller<T>(&self, job: JobName, interval_secs: u64, cancel: CancellationToken) -> JobPoller<T>
    where
        T: serde::de::DeserializeOwned,
    {
        JobPoller::new(
            job,
            self.transport.clone(),
            self.clock.clone(),
            self.poll_config(interval_secs),
            cancel,
        )
    }

    #[tracing::instrument(skip(self, on_progress))]
    pub async fn run_audit(
        &self,
        project_path: &str,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<AuditResult, AppError> {
        let started_at = self.clock.now();
        let cancel = self.cancel.child_token();

        let mut source_docs: JobPoller<ParseResponse> = self.poller(
            JobName::SourceDocs,
            self.polling.source_docs_interval_secs,
            cancel.clone(),
        );
        let mut general_ledger: JobPoller<GeneralLedgerResponse> = self.poller(
            JobName::GeneralLedger,
            self.polling.general_ledger_interval_secs,
            cancel.clone(),
        );

        let source_docs_prefix = JobName::SourceDocs.prefix_for(project_path);
        let general_ledger_prefix = JobName::GeneralLedger.prefix_for(project_path);

        let (source_docs_started, general_ledger_started) = tokio::join!(
            source_docs.start(&source_docs_prefix),
            general_ledger.start(&general_ledger_prefix)
        );

        match (&source_docs_started, &general_ledger_started) {
            (Ok(handle), Err(_)) | (Err(_), Ok(handle)) => {
                tracing::warn!(
                    job = %handle.job,
                    workflow_key = %handle.workflow_key,
                    "Audit abandoned after partial start; started job is left running"
                );
            }
            _ => {}
        }
        source_docs_started?;
        general_ledger_started?;

        let outcome = tokio::try_join!(
            source_docs.wait(on_progress),
            general_ledger.wait(on_progress)
        );

        let elapsed = (self.clock.now() - started_at).to_std().unwrap_or_default();
        metrics::histogram!("explain_audit_duration_seconds").record(elapsed.as_secs_f64());

        match outcome {
            Ok((source_docs, general_ledger)) => {
                tracing::info!(
                    project = %project_path,
                    processed_documents = source_docs.processed_files.len(),
                    total_transactions = general_ledger.total_transactions,
                    elapsed_secs = elapsed.as_secs(),
                    "Audit completed"
                );
                Ok(AuditResult {
                    source_docs,
                    general_ledger,
                })
            }
            Err(e) => {
                cancel.cancel();
                tracing::error!(project = %project_path, error = %e, "Audit failed");
                Err(e)
            }
        }
    }

    /// Ledger-only audit, polled at the ledger-only cadence.
    #[tracing::instrument(skip(self, on_progress))]
    pub async fn run_general_ledger_audit(
        &self,
        project_path: &str,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<GeneralLedgerResponse, AppError> {
        let mut poller: JobPoller<GeneralLedgerResponse> = self.poller(
            JobName::GeneralLedger,
            self.polling.ledger_only_interval_secs,
            self.cancel.child_token(),
        );

        let prefix = JobName::GeneralLedger.prefix_for(project_path);
        let result = poller.run(&prefix, on_progress).await?;

        tracing::info!(
            project = %project_path,
            processed_files = result.processed_files.len(),
            total_transactions = result.total_transactions,
            "General ledger audit completed"
        );
        Ok(result)
    }
}
