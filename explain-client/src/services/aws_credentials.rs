//! Identity-pool federation: exchanges the stored identity token for
//! temporary AWS credentials and builds S3 clients from them.

use crate::models::StoredCredentialRecord;
use crate::services::object_store::{ObjectStore, S3ObjectStore, StorageConnector, StorageFailure};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::{error::CredentialsError, future, ProvideCredentials};
use aws_credential_types::Credentials;
use aws_sdk_cognitoidentity::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cognitoidentity::Client as IdentityClient;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Shared SDK configuration for `region`. Requests are unsigned until a
/// credentials provider is attached.
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .no_credentials()
        .load()
        .await
}

/// Credentials provider backed by a Cognito identity pool.
#[derive(Clone)]
pub struct CognitoIdentityCredentials {
    client: IdentityClient,
    record: StoredCredentialRecord,
}

impl std::fmt::Debug for CognitoIdentityCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CognitoIdentityCredentials")
            .field("identity_pool_id", &self.record.identity_pool_id)
            .field("region", &self.record.region)
            .finish_non_exhaustive()
    }
}

impl CognitoIdentityCredentials {
    pub fn new(client: IdentityClient, record: StoredCredentialRecord) -> Self {
        Self { client, record }
    }

    async fn fetch(&self) -> Result<Credentials, CredentialsError> {
        let token = self.record.id_token.clone().ok_or_else(|| {
            CredentialsError::not_loaded("NotAuthorizedException: Invalid login token. No id token stored")
        })?;
        let login_provider = self.record.login_provider();

        let identity = self
            .client
            .get_id()
            .identity_pool_id(&self.record.identity_pool_id)
            .logins(&login_provider, &token)
            .send()
            .await
            .map_err(|e| federation_error("GetId", e))?;

        let identity_id = identity
            .identity_id()
            .ok_or_else(|| CredentialsError::unhandled("GetId returned no identity id"))?;

        let output = self
            .client
            .get_credentials_for_identity()
            .identity_id(identity_id)
            .logins(&login_provider, &token)
            .send()
            .await
            .map_err(|e| federation_error("GetCredentialsForIdentity", e))?;

        let credentials = output
            .credentials()
            .ok_or_else(|| CredentialsError::unhandled("identity pool returned no credentials"))?;

        let (Some(access_key_id), Some(secret_key)) =
            (credentials.access_key_id(), credentials.secret_key())
        else {
            return Err(CredentialsError::unhandled(
                "identity pool returned incomplete credentials",
            ));
        };

        let expiry = credentials
            .expiration()
            .and_then(|at| SystemTime::try_from(*at).ok());

        tracing::debug!(identity_id = %identity_id, "Federated identity credentials issued");

        Ok(Credentials::new(
            access_key_id,
            secret_key,
            credentials.session_token().map(str::to_string),
            expiry,
            "cognito-identity",
        ))
    }
}

impl ProvideCredentials for CognitoIdentityCredentials {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.fetch())
    }
}

/// Keeps the service error code at the front of the message so
/// authentication failures stay recognisable through the S3 error chain.
fn federation_error<E, R>(step: &str, err: SdkError<E, R>) -> CredentialsError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().unwrap_or("Unknown").to_string();
    tracing::warn!(step, code = %code, "Identity federation failed");
    CredentialsError::provider_error(format!("{}: {} ({})", code, DisplayErrorContext(&err), step))
}

/// Connects S3 object stores using identity-pool credentials.
#[derive(Default)]
pub struct S3Connector {
    configs: DashMap<String, SdkConfig>,
}

impl S3Connector {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sdk_config(&self, region: &str) -> SdkConfig {
        if let Some(config) = self.configs.get(region) {
            return config.clone();
        }
        let config = load_sdk_config(region).await;
        self.configs.insert(region.to_string(), config.clone());
        config
    }
}

#[async_trait]
impl StorageConnector for S3Connector {
    async fn connect(
        &self,
        record: &StoredCredentialRecord,
    ) -> Result<Arc<dyn ObjectStore>, StorageFailure> {
        if record.id_token.is_none() {
            return Err(StorageFailure::new(
                Some("NotAuthorizedException"),
                "Invalid login token. No id token stored",
            ));
        }

        let sdk_config = self.sdk_config(&record.region).await;
        let provider = CognitoIdentityCredentials::new(IdentityClient::new(&sdk_config), record.clone());
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .credentials_provider(provider)
            .build();

        Ok(Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::from_conf(s3_config))))
    }
}
