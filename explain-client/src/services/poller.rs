//! Start-then-poll tracking of long-running backend jobs.
//!
//! ```text
//! NotStarted -> Starting -> Polling -> Succeeded
//!                  |           |
//!                  +-----------+-----> Failed(kind)
//! ```
//!
//! Polls are strictly sequential: the next status request is issued only
//! after the previous one resolved and the inter-poll delay elapsed.

use crate::models::{JobHandle, JobName, JobProgress, JobStatus, WorkflowStarted};
use crate::utils::clock::Clock;
use async_trait::async_trait;
use explain_core::error::{AppError, FailureKind};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Progress callback. Invoked once per `in_progress` poll, never after
/// cancellation.
pub type ProgressFn<'a> = dyn Fn(&JobProgress) + Send + Sync + 'a;

/// The start/status endpoints of the job backend.
#[async_trait]
pub trait JobTransport: Send + Sync {
    async fn start_job(&self, job: JobName, prefix: &str) -> Result<WorkflowStarted, AppError>;

    /// Raw status body; decoding into [`JobStatus`] is the poller's job.
    async fn job_status(&self, job: JobName, prefix: &str) -> Result<serde_json::Value, AppError>;
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between an `in_progress` response and the next poll.
    pub interval: Duration,
    /// Upper bound on status requests.
    pub max_attempts: u32,
    /// Upper bound on time spent polling, measured from the first poll.
    pub max_duration: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 720,
            max_duration: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    NotStarted,
    Starting,
    Polling { attempts: u32 },
    Succeeded,
    Failed(FailureKind),
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Succeeded | PollState::Failed(_))
    }
}

/// Result of a single status request that did not fail.
#[derive(Debug)]
pub enum PollOutcome<T> {
    Pending(JobProgress),
    Done(T),
}

pub struct JobPoller<T> {
    job: JobName,
    transport: Arc<dyn JobTransport>,
    clock: Arc<dyn Clock>,
    config: PollConfig,
    cancel: CancellationToken,
    state: PollState,
    handle: Option<JobHandle>,
    attempts: u32,
    _result: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> JobPoller<T> {
    pub fn new(
        job: JobName,
        transport: Arc<dyn JobTransport>,
        clock: Arc<dyn Clock>,
        config: PollConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job,
            transport,
            clock,
            config,
            cancel,
            state: PollState::NotStarted,
            handle: None,
            attempts: 0,
            _result: PhantomData,
        }
    }

    pub fn job(&self) -> JobName {
        self.job
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn handle(&self) -> Option<&JobHandle> {
        self.handle.as_ref()
    }

    /// Number of status requests issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Issue the start request for `prefix`.
    pub async fn start(&mut self, prefix: &str) -> Result<JobHandle, AppError> {
        if self.state != PollState::NotStarted {
            return Err(AppError::Invariant(format!(
                "{} job started twice",
                self.job
            )));
        }

        self.state = PollState::Starting;
        tracing::info!(job = %self.job, prefix = %prefix, "Starting job");

        match self.transport.start_job(self.job, prefix).await {
            Ok(started) => {
                let handle = JobHandle {
                    job: self.job,
                    workflow_key: started.workflow_key,
                    prefix: prefix.to_string(),
                };
                tracing::info!(
                    job = %self.job,
                    workflow_key = %handle.workflow_key,
                    "Job started"
                );
                self.handle = Some(handle.clone());
                self.state = PollState::Polling { attempts: 0 };
                Ok(handle)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Issue one status request and apply the resulting transition.
    ///
    /// An `error` status becomes [`AppError::Job`] carrying the backend's
    /// message; `success` without a result is an invariant violation.
    pub async fn poll_once(&mut self) -> Result<PollOutcome<T>, AppError> {
        let prefix = match (&self.state, &self.handle) {
            (PollState::Polling { .. }, Some(handle)) => handle.prefix.clone(),
            _ => {
                return Err(AppError::Invariant(format!(
                    "{} job polled in state {:?}",
                    self.job, self.state
                )))
            }
        };

        self.attempts += 1;
        self.state = PollState::Polling {
            attempts: self.attempts,
        };
        metrics::counter!("explain_job_polls_total", "job" => self.job.as_str()).increment(1);

        let body = match self.transport.job_status(self.job, &prefix).await {
            Ok(body) => body,
            Err(e) => return Err(self.fail(e)),
        };

        let status: JobStatus<T> = match serde_json::from_value(body) {
            Ok(status) => status,
            Err(e) => {
                let operation = format!("check {} status", self.job.description());
                return Err(self.fail(AppError::transport(
                    operation,
                    anyhow::anyhow!("unparseable status response: {}", e),
                )));
            }
        };

        match status {
            JobStatus::InProgress(progress) => {
                tracing::debug!(
                    job = %self.job,
                    attempt = self.attempts,
                    stage = progress.current_stage.as_deref().unwrap_or(""),
                    file = progress.current_file.as_deref().unwrap_or(""),
                    "Job in progress"
                );
                Ok(PollOutcome::Pending(JobProgress {
                    job: self.job,
                    prefix,
                    attempt: self.attempts,
                    current_file: progress.current_file,
                    current_stage: progress.current_stage,
                    progress_percentage: progress.progress_percentage,
                }))
            }
            JobStatus::Success { result: Some(result) } => {
                self.state = PollState::Succeeded;
                metrics::counter!(
                    "explain_job_outcomes_total",
                    "job" => self.job.as_str(),
                    "outcome" => "success"
                )
                .increment(1);
                tracing::info!(job = %self.job, attempts = self.attempts, "Job succeeded");
                Ok(PollOutcome::Done(result))
            }
            JobStatus::Success { result: None } => Err(self.fail(AppError::Invariant(format!(
                "{} job reported success without a result",
                self.job
            )))),
            JobStatus::Error { error } => {
                let message = error.unwrap_or_else(|| format!("{} failed", self.job.description()));
                Err(self.fail(AppError::Job(message)))
            }
        }
    }

    /// Poll until a terminal status, cancellation or a polling limit.
    pub async fn wait(&mut self, on_progress: Option<&ProgressFn<'_>>) -> Result<T, AppError> {
        let cancel = self.cancel.clone();
        let clock = self.clock.clone();
        let started_at = clock.now();

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            let elapsed = (clock.now() - started_at).to_std().unwrap_or_default();
            if self.attempts >= self.config.max_attempts || elapsed >= self.config.max_duration {
                let err = AppError::Timeout {
                    operation: self.job.description().to_string(),
                    attempts: self.attempts,
                    elapsed,
                };
                return Err(self.fail(err));
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                outcome = self.poll_once() => outcome?,
            };

            match outcome {
                PollOutcome::Done(result) => return Ok(result),
                PollOutcome::Pending(progress) => {
                    if cancel.is_cancelled() {
                        return Err(self.cancelled());
                    }
                    if let Some(on_progress) = on_progress {
                        on_progress(&progress);
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                _ = clock.sleep(self.config.interval) => {}
            }
        }
    }

    /// `start` followed by `wait`.
    pub async fn run(&mut self, prefix: &str, on_progress: Option<&ProgressFn<'_>>) -> Result<T, AppError> {
        self.start(prefix).await?;
        self.wait(on_progress).await
    }

    fn cancelled(&mut self) -> AppError {
        self.fail(AppError::Cancelled(format!("{} job", self.job.description())))
    }

    fn fail(&mut self, err: AppError) -> AppError {
        let kind = err.kind();
        self.state = PollState::Failed(kind);
        metrics::counter!(
            "explain_job_outcomes_total",
            "job" => self.job.as_str(),
            "outcome" => kind.as_str()
        )
        .increment(1);
        tracing::warn!(
            job = %self.job,
            kind = %kind,
            attempts = self.attempts,
            error = %err,
            "Job failed"
        );
        err
    }
}
