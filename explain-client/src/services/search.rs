use crate::models::{CheckFilesResponse, DeleteFilesResponse, SearchRequest, SearchResponse};
use crate::services::backend_client::BackendClient;
use explain_core::error::AppError;

const SEARCH_PATH: &str = "/api/search";
const DELETE_FILES_PATH: &str = "/api/search/delete-files";
const CHECK_FILES_PATH: &str = "/api/search/check-files";

/// Full-text search over indexed document chunks.
#[derive(Clone)]
pub struct SearchClient {
    backend: BackendClient,
}

impl SearchClient {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    #[tracing::instrument(skip(self))]
    pub async fn search(&self, query: &str, company: &str) -> Result<SearchResponse, AppError> {
        let request = SearchRequest {
            query: query.to_string(),
            company: company.to_string(),
        };
        let response: SearchResponse = self.backend.post_json("search", SEARCH_PATH, &request).await?;
        tracing::debug!(total_hits = response.total_hits, "Search completed");
        Ok(response)
    }
}

/// Maintenance of the search index for a storage prefix.
#[derive(Clone)]
pub struct IndexClient {
    backend: BackendClient,
}

impl IndexClient {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    /// Remove every indexed chunk whose source file lives under `prefix`.
    #[tracing::instrument(skip(self))]
    pub async fn delete_files(&self, prefix: &str) -> Result<DeleteFilesResponse, AppError> {
        let response: DeleteFilesResponse = self
            .backend
            .post_prefix("delete indexed files", DELETE_FILES_PATH, prefix)
            .await?;

        if !response.failed_files.is_empty() {
            tracing::warn!(
                prefix = %prefix,
                failed = response.failed_files.len(),
                "Some indexed files could not be deleted"
            );
        }
        Ok(response)
    }

    /// Report which files under `prefix` have been processed into the index.
    #[tracing::instrument(skip(self))]
    pub async fn check_files(&self, prefix: &str) -> Result<CheckFilesResponse, AppError> {
        self.backend
            .post_prefix("check indexed files", CHECK_FILES_PATH, prefix)
            .await
    }
}
