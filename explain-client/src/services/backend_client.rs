//! HTTP client for the explain backend.
//!
//! Every request carries the current identity token as a bearer credential
//! and the active organization in `X-Organization-Id`. Both are read at call
//! time, never cached.

use crate::config::BackendSettings;
use crate::models::{JobName, WorkflowStarted};
use crate::services::poller::JobTransport;
use crate::services::session::Session;
use async_trait::async_trait;
use explain_core::error::AppError;
use explain_core::observability::TraceHeadersExt;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const ORGANIZATION_HEADER: &str = "X-Organization-Id";

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    session: Session,
}

#[derive(Serialize)]
struct PrefixBody<'a> {
    prefix: &'a str,
}

impl BackendClient {
    pub fn new(settings: &BackendSettings, session: Session) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `path` and decode the JSON response.
    ///
    /// `operation` names the call in errors, e.g. "check files".
    pub async fn post_json<B, R>(&self, operation: &str, path: &str, body: &B) -> Result<R, AppError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let token = self.session.tokens().id_token()?;
        let organization_id = self.session.tenants().organization_id()?;
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header(ORGANIZATION_HEADER, &organization_id)
            .json(body)
            .with_trace_headers()
            .send()
            .await
            .map_err(|e| {
                tracing::error!(operation, url = %url, error = %e, "Backend request failed");
                AppError::transport(operation, e)
            })?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate("Backend rejected the identity token");
            return Err(AppError::SessionExpired);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_detail(&body).unwrap_or_else(|| format!("HTTP {}", status));
            tracing::error!(
                operation,
                url = %url,
                status = status.as_u16(),
                message = %message,
                "Backend returned an error status"
            );
            return Err(AppError::Transport {
                operation: operation.to_string(),
                status: Some(status.as_u16()),
                source: anyhow::anyhow!(message),
            });
        }

        response.json::<R>().await.map_err(|e| {
            tracing::error!(operation, url = %url, error = %e, "Unparseable backend response");
            AppError::transport(operation, e)
        })
    }

    pub async fn post_prefix<R: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        prefix: &str,
    ) -> Result<R, AppError> {
        self.post_json(operation, path, &PrefixBody { prefix }).await
    }
}

/// Pull an `error` or `detail` message out of an error body, if any.
fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[async_trait]
impl JobTransport for BackendClient {
    async fn start_job(&self, job: JobName, prefix: &str) -> Result<WorkflowStarted, AppError> {
        let operation = format!("start {}", job.description());
        self.post_prefix(&operation, job.start_path(), prefix).await
    }

    async fn job_status(&self, job: JobName, prefix: &str) -> Result<serde_json::Value, AppError> {
        let operation = format!("check {} status", job.description());
        self.post_prefix(&operation, job.status_path(), prefix).await
    }
}
