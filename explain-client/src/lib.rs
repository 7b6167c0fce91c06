pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use config::Settings;
use explain_core::error::AppError;
use services::audit::AuditOrchestrator;
use services::aws_credentials::S3Connector;
use services::backend_client::BackendClient;
use services::claims::BucketResolver;
use services::identity::{AuthService, CognitoIdentityProvider, IdentityProvider};
use services::local_store::{FileLocalStore, LocalStore};
use services::object_store::StorageConnector;
use services::search::{IndexClient, SearchClient};
use services::session::Session;
use services::storage_gateway::StorageGateway;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use utils::clock::{Clock, SystemClock};

/// Everything a command needs, wired around one [`Session`].
#[derive(Clone)]
pub struct AppContext {
    pub session: Session,
    pub auth: AuthService,
    pub audit: AuditOrchestrator,
    pub search: SearchClient,
    pub index: IndexClient,
    pub storage: StorageGateway,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancellationToken,
}

impl AppContext {
    /// Production wiring: file-backed state, Cognito and S3.
    pub async fn build(settings: &Settings, cancel: CancellationToken) -> Result<Self, AppError> {
        let store = Arc::new(FileLocalStore::open(&settings.session.state_dir)?);
        let identity = Arc::new(CognitoIdentityProvider::new(&settings.cognito).await);

        Self::from_parts(
            settings,
            store,
            identity,
            Arc::new(S3Connector::new()),
            Arc::new(SystemClock),
            cancel,
        )
    }

    pub fn from_parts(
        settings: &Settings,
        store: Arc<dyn LocalStore>,
        identity: Arc<dyn IdentityProvider>,
        connector: Arc<dyn StorageConnector>,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Result<Self, AppError> {
        let session = Session::new(store);
        let backend = BackendClient::new(&settings.backend, session.clone())?;
        let resolver = BucketResolver::new(
            settings.storage.fallback_bucket.clone(),
            settings.storage.bucket_suffix.clone(),
        );

        Ok(Self {
            auth: AuthService::new(identity, session.clone(), settings.cognito.clone()),
            audit: AuditOrchestrator::new(
                Arc::new(backend.clone()),
                clock.clone(),
                settings.polling.clone(),
                cancel.clone(),
            ),
            search: SearchClient::new(backend.clone()),
            index: IndexClient::new(backend),
            storage: StorageGateway::new(session.clone(), resolver, connector),
            session,
            clock,
            cancel,
        })
    }
}
