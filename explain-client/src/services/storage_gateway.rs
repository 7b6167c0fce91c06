//! Tenant-scoped folder and file operations on object storage.
//!
//! Every call resolves the bucket from the current token and organization
//! before connecting, so a tenant switch takes effect on the next call.

use crate::models::{FileEntry, FolderEntry, UploadFile};
use crate::services::claims::BucketResolver;
use crate::services::object_store::{ObjectStore, StorageConnector, StorageFailure};
use crate::services::session::Session;
use explain_core::error::AppError;
use std::sync::Arc;

const AUTH_FAILURE_CODES: &[&str] = &["NotAuthorizedException", "ExpiredToken", "ExpiredTokenException"];
const AUTH_FAILURE_MESSAGES: &[&str] = &["Invalid login token", "Token expired"];

/// `true` when `failure` means the credentials are invalid or expired.
pub fn is_auth_failure(failure: &StorageFailure) -> bool {
    let code_matches = failure
        .code
        .as_deref()
        .is_some_and(|code| AUTH_FAILURE_CODES.contains(&code));

    code_matches
        || AUTH_FAILURE_CODES
            .iter()
            .chain(AUTH_FAILURE_MESSAGES)
            .any(|needle| failure.message.contains(needle))
}

fn folder_prefix(path: &str) -> String {
    if path.is_empty() || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

#[derive(Clone)]
pub struct StorageGateway {
    session: Session,
    resolver: BucketResolver,
    connector: Arc<dyn StorageConnector>,
}

impl StorageGateway {
    pub fn new(session: Session, resolver: BucketResolver, connector: Arc<dyn StorageConnector>) -> Self {
        Self {
            session,
            resolver,
            connector,
        }
    }

    /// Bucket for the current token and organization.
    pub fn bucket(&self) -> Result<String, AppError> {
        let token = self.session.tokens().id_token()?;
        let organization = self.session.tenants().current();
        self.resolver
            .resolve(&token, organization.as_ref().map(|org| org.id.as_str()))
    }

    async fn connect(&self, operation: &str) -> Result<(Arc<dyn ObjectStore>, String), AppError> {
        let record = self.session.tokens().record()?;
        let bucket = self.bucket()?;
        let store = self
            .connector
            .connect(&record)
            .await
            .map_err(|e| self.failure(operation, e))?;
        Ok((store, bucket))
    }

    /// Authentication failures end the session; anything else is wrapped
    /// with the operation name.
    fn failure(&self, operation: &str, failure: StorageFailure) -> AppError {
        if is_auth_failure(&failure) {
            self.session.invalidate(&failure.message);
            return AppError::SessionExpired;
        }

        tracing::error!(
            operation,
            code = failure.code.as_deref().unwrap_or(""),
            error = %failure,
            "Storage operation failed"
        );
        metrics::counter!("explain_storage_failures_total", "operation" => operation.to_string())
            .increment(1);
        AppError::Storage {
            operation: operation.to_string(),
            source: anyhow::Error::new(failure),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_folders(&self, path: &str) -> Result<Vec<FolderEntry>, AppError> {
        let operation = "list folders";
        let (store, bucket) = self.connect(operation).await?;
        let prefix = folder_prefix(path);

        let prefixes = store
            .list_common_prefixes(&bucket, &prefix)
            .await
            .map_err(|e| self.failure(operation, e))?;

        Ok(prefixes
            .into_iter()
            .filter_map(|full_path| {
                let name = full_path.split('/').filter(|s| !s.is_empty()).last()?.to_string();
                Some(FolderEntry { name, full_path })
            })
            .collect())
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>, AppError> {
        let operation = "list files";
        let (store, bucket) = self.connect(operation).await?;

        let keys = store
            .list_keys(&bucket, path)
            .await
            .map_err(|e| self.failure(operation, e))?;

        Ok(keys
            .into_iter()
            .filter_map(|full_path| {
                let name = full_path.rsplit('/').next().filter(|n| !n.is_empty())?.to_string();
                Some(FileEntry { name, full_path })
            })
            .collect())
    }

    /// Write the zero-length `path/` marker object.
    #[tracing::instrument(skip(self))]
    pub async fn create_folder(&self, path: &str) -> Result<(), AppError> {
        let operation = "create folder";
        let (store, bucket) = self.connect(operation).await?;
        let marker = folder_prefix(path);

        store
            .put_object(&bucket, &marker, Vec::new(), None)
            .await
            .map_err(|e| self.failure(operation, e))?;

        tracing::info!(bucket = %bucket, folder = %marker, "Folder created");
        Ok(())
    }

    #[tracing::instrument(skip(self, file), fields(file = %file.name, bytes = file.bytes.len()))]
    pub async fn upload_file(&self, path: &str, file: UploadFile) -> Result<(), AppError> {
        let operation = "upload file";
        let (store, bucket) = self.connect(operation).await?;
        let key = format!("{}{}", folder_prefix(path), file.name);

        store
            .put_object(&bucket, &key, file.bytes, file.content_type.as_deref())
            .await
            .map_err(|e| self.failure(operation, e))?;

        tracing::info!(bucket = %bucket, key = %key, "File uploaded");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_file(&self, key: &str) -> Result<(), AppError> {
        let operation = "delete file";
        let (store, bucket) = self.connect(operation).await?;

        store
            .delete_object(&bucket, key)
            .await
            .map_err(|e| self.failure(operation, e))?;

        tracing::info!(bucket = %bucket, key = %key, "File deleted");
        Ok(())
    }

    /// Delete every object under `path/` in one batch, or only the folder
    /// marker when nothing is listed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_folder(&self, path: &str) -> Result<(), AppError> {
        let operation = "delete folder";
        let (store, bucket) = self.connect(operation).await?;
        let prefix = folder_prefix(path);

        let keys = store
            .list_keys(&bucket, &prefix)
            .await
            .map_err(|e| self.failure(operation, e))?;

        if keys.is_empty() {
            store
                .delete_object(&bucket, &prefix)
                .await
                .map_err(|e| self.failure(operation, e))?;
        } else {
            store
                .delete_objects(&bucket, &keys)
                .await
                .map_err(|e| self.failure(operation, e))?;
        }

        tracing::info!(bucket = %bucket, folder = %prefix, objects = keys.len(), "Folder deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_prefix_appends_single_slash() {
        assert_eq!(folder_prefix(""), "");
        assert_eq!(folder_prefix("acme"), "acme/");
        assert_eq!(folder_prefix("acme/"), "acme/");
    }

    #[test]
    fn auth_failures_match_by_code_or_message() {
        assert!(is_auth_failure(&StorageFailure::new(
            Some("NotAuthorizedException"),
            "denied"
        )));
        assert!(is_auth_failure(&StorageFailure::new(
            None,
            "dispatch failure: NotAuthorizedException: Invalid login token"
        )));
        assert!(is_auth_failure(&StorageFailure::new(Some("ExpiredToken"), "x")));
        assert!(is_auth_failure(&StorageFailure::new(None, "Token expired: 1700000000")));
        assert!(!is_auth_failure(&StorageFailure::new(Some("NoSuchBucket"), "missing")));
    }
}
