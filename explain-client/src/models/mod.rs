pub mod audit;
pub mod credentials;
pub mod organization;
pub mod search;
pub mod storage;

pub use audit::{
    AuditResult, GeneralLedgerResponse, InProgress, JobHandle, JobName, JobProgress, JobStatus,
    ParseResponse, WorkflowStarted,
};
pub use credentials::{RememberedCredentials, StoredCredentialRecord, UserProfile};
pub use organization::Organization;
pub use search::{CheckFilesResponse, DeleteFilesResponse, SearchHit, SearchRequest, SearchResponse};
pub use storage::{FileEntry, FolderEntry, UploadFile};
