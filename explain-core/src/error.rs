use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an [`AppError`], recorded on every failure log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Missing, expired or rejected credentials.
    Credential,
    /// No tenant selected or no bucket resolvable.
    Resolution,
    /// Network failure or non-2xx response.
    Transport,
    /// Backend reported `status: error` for a job.
    Application,
    Timeout,
    Cancelled,
    /// Programming-level fault, never a user error.
    Invariant,
    Config,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Credential => "credential",
            FailureKind::Resolution => "resolution",
            FailureKind::Transport => "transport",
            FailureKind::Application => "application",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Invariant => "invariant",
            FailureKind::Config => "config",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Session expired. Please log in again.")]
    SessionExpired,

    #[error("Not authenticated: {0}")]
    Unauthenticated(anyhow::Error),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("No organization selected. Please select an organization.")]
    NoOrganization,

    #[error("No organizations found in user groups.")]
    NoOrganizations,

    #[error("No bucket name found in user groups and no fallback bucket configured")]
    NoBucket,

    #[error("Failed to {operation}: {source}")]
    Transport {
        operation: String,
        status: Option<u16>,
        #[source]
        source: anyhow::Error,
    },

    /// Message is passed through verbatim from the backend.
    #[error("{0}")]
    Job(String),

    #[error("{operation} timed out after {attempts} polls ({elapsed:?})")]
    Timeout {
        operation: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("{0} was cancelled")]
    Cancelled(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Failed to {operation}: {source}")]
    Storage {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AppError::SessionExpired | AppError::Unauthenticated(_) | AppError::AuthFailed(_) => {
                FailureKind::Credential
            }
            AppError::NoOrganization | AppError::NoOrganizations | AppError::NoBucket => {
                FailureKind::Resolution
            }
            AppError::Transport { .. } | AppError::Storage { .. } => FailureKind::Transport,
            AppError::Job(_) => FailureKind::Application,
            AppError::Timeout { .. } => FailureKind::Timeout,
            AppError::Cancelled(_) => FailureKind::Cancelled,
            AppError::Invariant(_) => FailureKind::Invariant,
            AppError::ConfigError(_) => FailureKind::Config,
            AppError::InternalError(_) => FailureKind::Internal,
        }
    }

    /// Wrap a lower-level failure as a transport error for `operation`.
    pub fn transport(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        AppError::Transport {
            operation: operation.into(),
            status: None,
            source: source.into(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}
