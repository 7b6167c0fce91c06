use serde::{Deserialize, Serialize};

/// The two backend workflows an audit is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobName {
    SourceDocs,
    GeneralLedger,
}

impl JobName {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::SourceDocs => "source_docs",
            JobName::GeneralLedger => "general_ledger",
        }
    }

    pub fn start_path(&self) -> &'static str {
        match self {
            JobName::SourceDocs => "/api/parse/source-docs/start/",
            JobName::GeneralLedger => "/api/parse/general-ledger/start/",
        }
    }

    pub fn status_path(&self) -> &'static str {
        match self {
            JobName::SourceDocs => "/api/parse/source-docs/status/",
            JobName::GeneralLedger => "/api/parse/general-ledger/status/",
        }
    }

    /// Human phrase used in error context, e.g. "start general ledger parsing".
    pub fn description(&self) -> &'static str {
        match self {
            JobName::SourceDocs => "source documents parsing",
            JobName::GeneralLedger => "general ledger parsing",
        }
    }

    /// Sub-folder of a project holding this job's inputs.
    pub fn folder(&self) -> &'static str {
        match self {
            JobName::SourceDocs => "Source Documents",
            JobName::GeneralLedger => "General Ledger",
        }
    }

    /// Storage prefix for this job within `project_path`.
    pub fn prefix_for(&self, project_path: &str) -> String {
        format!("{}/{}/", project_path.trim_end_matches('/'), self.folder())
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one started backend job for the lifetime of a polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job: JobName,
    pub workflow_key: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStarted {
    pub workflow_key: String,
}

/// Intermediate fields reported while a job is running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InProgress {
    #[serde(default)]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub current_file: Option<String>,
    #[serde(default)]
    pub progress_percentage: Option<f64>,
    #[serde(default)]
    pub processed_count: Option<u64>,
    #[serde(default)]
    pub total_files: Option<u64>,
}

/// A status poll response, tagged by its `status` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub enum JobStatus<T> {
    InProgress(InProgress),
    Success {
        #[serde(default)]
        result: Option<T>,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
    },
}

impl<T> JobStatus<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::InProgress(_))
    }
}

/// Progress snapshot handed to callers, tagged with the job it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobProgress {
    pub job: JobName,
    pub prefix: String,
    pub attempt: u32,
    pub current_file: Option<String>,
    pub current_stage: Option<String>,
    pub progress_percentage: Option<f64>,
}

impl JobProgress {
    /// "Processing {file} - {stage}", or whichever half is known.
    pub fn status_message(&self) -> Option<String> {
        match (&self.current_file, &self.current_stage) {
            (Some(file), Some(stage)) => Some(format!("Processing {} - {}", file, stage)),
            (Some(file), None) => Some(format!("Processing {}", file)),
            (None, Some(stage)) => Some(stage.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResponse {
    #[serde(default)]
    pub processed_files: Vec<String>,
    #[serde(default)]
    pub failed_files: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub total_chunks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralLedgerResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub processed_files: Vec<String>,
    #[serde(default)]
    pub failed_files: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub total_transactions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditResult {
    pub source_docs: ParseResponse,
    pub general_ledger: GeneralLedgerResponse,
}
