use crate::models::StoredCredentialRecord;
use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;

/// `DeleteObjects` accepts at most this many keys per request.
pub const MAX_DELETE_BATCH: usize = 1000;

/// An object-store failure, with the service error code when one exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StorageFailure {
    pub code: Option<String>,
    pub message: String,
}

impl StorageFailure {
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug,
    {
        Self {
            code: err.code().map(str::to_string),
            message: DisplayErrorContext(&err).to_string(),
        }
    }
}

/// Bucket-scoped object operations used by the storage gateway.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Prefixes one `/`-delimited level below `prefix`.
    async fn list_common_prefixes(&self, bucket: &str, prefix: &str)
        -> Result<Vec<String>, StorageFailure>;

    /// Every key starting with `prefix`.
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageFailure>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageFailure>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageFailure>;

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageFailure>;
}

/// Builds an [`ObjectStore`] authorized by a stored credential record.
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn connect(
        &self,
        record: &StoredCredentialRecord,
    ) -> Result<Arc<dyn ObjectStore>, StorageFailure>;
}

pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<(Vec<String>, Vec<String>), StorageFailure> {
        let mut keys = Vec::new();
        let mut prefixes = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_delimiter(delimiter.map(str::to_string))
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(StorageFailure::from_sdk)?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
            prefixes.extend(
                output
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok((keys, prefixes))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, StorageFailure> {
        let (_, prefixes) = self.list(bucket, prefix, Some("/")).await?;
        Ok(prefixes)
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageFailure> {
        let (keys, _) = self.list(bucket, prefix, None).await?;
        Ok(keys)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageFailure> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(StorageFailure::from_sdk)?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageFailure> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(StorageFailure::from_sdk)?;
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageFailure> {
        for chunk in keys.chunks(MAX_DELETE_BATCH) {
            let objects = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageFailure::new(None, format!("invalid object key: {}", e)))?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| StorageFailure::new(None, format!("invalid delete request: {}", e)))?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(StorageFailure::from_sdk)?;

            if let Some(failed) = output.errors().first() {
                return Err(StorageFailure::new(
                    failed.code(),
                    format!(
                        "failed to delete {} of {} objects, first {}: {}",
                        output.errors().len(),
                        chunk.len(),
                        failed.key().unwrap_or("<unknown>"),
                        failed.message().unwrap_or("unknown error")
                    ),
                ));
            }
        }
        Ok(())
    }
}
