use explain_core::config::{configuration_directory, load_settings};
use explain_core::error::AppError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub backend: BackendSettings,
    #[validate(nested)]
    pub cognito: CognitoSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    #[validate(nested)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct BackendSettings {
    /// Base URL of the explain backend, without trailing slash.
    #[validate(url)]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl BackendSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct CognitoSettings {
    #[validate(length(min = 1))]
    pub region: String,
    #[validate(length(min = 1))]
    pub user_pool_id: String,
    #[validate(length(min = 1))]
    pub client_id: String,
    #[validate(length(min = 1))]
    pub identity_pool_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Used when no bucket can be derived from the token's groups.
    #[serde(default)]
    pub fallback_bucket: Option<String>,
    #[serde(default = "default_bucket_suffix")]
    pub bucket_suffix: String,
}

fn default_bucket_suffix() -> String {
    "-bucket".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            fallback_bucket: None,
            bucket_suffix: default_bucket_suffix(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct PollingSettings {
    #[serde(default = "default_source_docs_interval")]
    #[validate(range(min = 1))]
    pub source_docs_interval_secs: u64,
    #[serde(default = "default_general_ledger_interval")]
    #[validate(range(min = 1))]
    pub general_ledger_interval_secs: u64,
    #[serde(default = "default_ledger_only_interval")]
    #[validate(range(min = 1))]
    pub ledger_only_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1))]
    pub max_attempts: u32,
    #[serde(default = "default_max_duration")]
    #[validate(range(min = 1))]
    pub max_duration_secs: u64,
}

fn default_source_docs_interval() -> u64 {
    5
}

fn default_general_ledger_interval() -> u64 {
    2
}

fn default_ledger_only_interval() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    720
}

fn default_max_duration() -> u64 {
    3600
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            source_docs_interval_secs: default_source_docs_interval(),
            general_ledger_interval_secs: default_general_ledger_interval(),
            ledger_only_interval_secs: default_ledger_only_interval(),
            max_attempts: default_max_attempts(),
            max_duration_secs: default_max_duration(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionSettings {
    #[serde(default = "default_token_check_interval")]
    pub token_check_interval_secs: u64,
    /// Directory holding the client-local state file.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_token_check_interval() -> u64 {
    30
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".explain")
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            token_check_interval_secs: default_token_check_interval(),
            state_dir: default_state_dir(),
        }
    }
}

impl SessionSettings {
    pub fn token_check_interval(&self) -> Duration {
        Duration::from_secs(self.token_check_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetrySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

pub fn get_configuration() -> Result<Settings, AppError> {
    let configuration_directory = configuration_directory("explain-client")?;
    load_settings(&configuration_directory)
}
