//! Shared fakes for explain-client integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use explain_client::config::{
    BackendSettings, CognitoSettings, PollingSettings, SessionSettings, Settings, StorageSettings,
    TelemetrySettings,
};
use explain_client::models::{JobName, StoredCredentialRecord, WorkflowStarted};
use explain_client::services::local_store::MemoryLocalStore;
use explain_client::services::object_store::{ObjectStore, StorageConnector, StorageFailure};
use explain_client::services::poller::JobTransport;
use explain_client::services::session::Session;
use explain_core::error::AppError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// Far-future `exp` for tokens that must not expire during a test.
pub const NEVER_EXPIRES: i64 = 4_102_444_800;

/// An unsigned three-segment token carrying `groups`.
pub fn token(groups: &[&str]) -> String {
    token_with_claims(serde_json::json!({
        "sub": "user-1",
        "email": "ana@acme.test",
        "name": "Ana",
        "cognito:groups": groups,
        "exp": NEVER_EXPIRES,
    }))
}

pub fn token_with_claims(claims: serde_json::Value) -> String {
    format!(
        "{}.{}.signature",
        general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
        general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

pub fn record(id_token: &str) -> StoredCredentialRecord {
    StoredCredentialRecord {
        identity_pool_id: "us-east-1:identity".to_string(),
        region: "us-east-1".to_string(),
        user_pool_id: "us-east-1_users".to_string(),
        id_token: Some(id_token.to_string()),
    }
}

/// A session holding `id_token` with its organizations initialized.
pub fn signed_in_session(id_token: &str) -> Session {
    let session = Session::new(Arc::new(MemoryLocalStore::new()));
    session
        .tokens()
        .save(&record(id_token))
        .expect("save token");
    // Tests with no `org-*` groups still want a stored token.
    let _ = session.tenants().initialize(id_token);
    session
}

pub fn settings(base_url: &str) -> Settings {
    Settings {
        backend: BackendSettings {
            base_url: base_url.to_string(),
            request_timeout_secs: 5,
        },
        cognito: CognitoSettings {
            region: "us-east-1".to_string(),
            user_pool_id: "us-east-1_users".to_string(),
            client_id: "client".to_string(),
            identity_pool_id: "us-east-1:identity".to_string(),
        },
        storage: StorageSettings::default(),
        polling: PollingSettings::default(),
        session: SessionSettings::default(),
        telemetry: TelemetrySettings::default(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Start(JobName, String),
    Status(JobName, String),
}

/// Job backend replaying scripted start and status responses per job.
///
/// An exhausted status script keeps answering `in_progress`.
#[derive(Default)]
pub struct ScriptedTransport {
    starts: Mutex<HashMap<JobName, Result<String, String>>>,
    statuses: Mutex<HashMap<JobName, VecDeque<serde_json::Value>>>,
    calls: Mutex<Vec<TransportCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn start_ok(&self, job: JobName, workflow_key: &str) {
        self.starts.lock().insert(job, Ok(workflow_key.to_string()));
    }

    pub fn start_fails(&self, job: JobName, message: &str) {
        self.starts.lock().insert(job, Err(message.to_string()));
    }

    pub fn statuses(&self, job: JobName, responses: Vec<serde_json::Value>) {
        self.statuses.lock().insert(job, responses.into());
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn status_calls(&self, job: JobName) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, TransportCall::Status(j, _) if *j == job))
            .count()
    }

    pub fn started(&self, job: JobName) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|call| matches!(call, TransportCall::Start(j, _) if *j == job))
    }
}

#[async_trait]
impl JobTransport for ScriptedTransport {
    async fn start_job(&self, job: JobName, prefix: &str) -> Result<WorkflowStarted, AppError> {
        self.calls
            .lock()
            .push(TransportCall::Start(job, prefix.to_string()));
        tokio::task::yield_now().await;

        let scripted = self
            .starts
            .lock()
            .get(&job)
            .cloned()
            .unwrap_or_else(|| Ok(format!("{}-workflow", job)));

        match scripted {
            Ok(workflow_key) => Ok(WorkflowStarted { workflow_key }),
            Err(message) => Err(AppError::Transport {
                operation: format!("start {}", job.description()),
                status: Some(500),
                source: anyhow::anyhow!(message),
            }),
        }
    }

    async fn job_status(&self, job: JobName, prefix: &str) -> Result<serde_json::Value, AppError> {
        self.calls
            .lock()
            .push(TransportCall::Status(job, prefix.to_string()));
        tokio::task::yield_now().await;

        Ok(self
            .statuses
            .lock()
            .get_mut(&job)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| serde_json::json!({ "status": "in_progress" })))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    ListPrefixes(String, String),
    ListKeys(String, String),
    Put(String, String),
    Delete(String, String),
    DeleteBatch(String, Vec<String>),
}

/// In-memory object store keyed by (bucket, key).
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), (Vec<u8>, Option<String>)>>,
    calls: Mutex<Vec<StoreCall>>,
    failure: Mutex<Option<StorageFailure>>,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, bucket: &str, key: &str) {
        self.objects
            .lock()
            .insert((bucket.to_string(), key.to_string()), (Vec::new(), None));
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<(Vec<u8>, Option<String>)> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Every following call fails with `failure`.
    pub fn fail_with(&self, failure: StorageFailure) {
        *self.failure.lock() = Some(failure);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    fn check(&self, call: StoreCall) -> Result<(), StorageFailure> {
        self.calls.lock().push(call);
        match self.failure.lock().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn keys(&self, bucket: &str, prefix: &str) -> Vec<String> {
        self.objects
            .lock()
            .keys()
            .filter(|(b, key)| b == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, StorageFailure> {
        self.check(StoreCall::ListPrefixes(bucket.to_string(), prefix.to_string()))?;

        let mut prefixes: Vec<String> = self
            .keys(bucket, prefix)
            .into_iter()
            .filter_map(|key| {
                let rest = &key[prefix.len()..];
                rest.find('/')
                    .map(|end| format!("{}{}", prefix, &rest[..=end]))
            })
            .collect();
        prefixes.dedup();
        Ok(prefixes)
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageFailure> {
        self.check(StoreCall::ListKeys(bucket.to_string(), prefix.to_string()))?;
        Ok(self.keys(bucket, prefix))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageFailure> {
        self.check(StoreCall::Put(bucket.to_string(), key.to_string()))?;
        self.objects.lock().insert(
            (bucket.to_string(), key.to_string()),
            (body, content_type.map(str::to_string)),
        );
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageFailure> {
        self.check(StoreCall::Delete(bucket.to_string(), key.to_string()))?;
        self.objects
            .lock()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageFailure> {
        self.check(StoreCall::DeleteBatch(bucket.to_string(), keys.to_vec()))?;
        let mut objects = self.objects.lock();
        for key in keys {
            objects.remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }
}

/// Hands out one shared [`MemoryObjectStore`], or a scripted failure.
pub struct FakeConnector {
    pub store: Arc<MemoryObjectStore>,
    failure: Mutex<Option<StorageFailure>>,
    connects: Mutex<Vec<StoredCredentialRecord>>,
}

impl FakeConnector {
    pub fn new(store: Arc<MemoryObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            failure: Mutex::new(None),
            connects: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_with(&self, failure: StorageFailure) {
        *self.failure.lock() = Some(failure);
    }

    pub fn connects(&self) -> usize {
        self.connects.lock().len()
    }
}

#[async_trait]
impl StorageConnector for FakeConnector {
    async fn connect(
        &self,
        record: &StoredCredentialRecord,
    ) -> Result<Arc<dyn ObjectStore>, StorageFailure> {
        self.connects.lock().push(record.clone());
        if let Some(failure) = self.failure.lock().clone() {
            return Err(failure);
        }
        Ok(self.store.clone())
    }
}
