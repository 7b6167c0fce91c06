use crate::models::Organization;
use crate::services::claims::resolve_organizations;
use crate::services::local_store::{LocalStore, CURRENT_ORGANIZATION_KEY};
use explain_core::error::AppError;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum TenantEvent {
    Changed(Organization),
    Cleared,
}

/// Outcome of initializing the selection from a token.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantState {
    pub available: Vec<Organization>,
    pub current: Organization,
}

/// The single active organization, persisted across runs.
///
/// Setters are expected to be serialized by the caller (last write wins);
/// readers always go back to the local store.
#[derive(Clone)]
pub struct TenantSelector {
    store: Arc<dyn LocalStore>,
    events: broadcast::Sender<TenantEvent>,
}

impl TenantSelector {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self { store, events }
    }

    /// Resolve organizations from `token` and settle on a current one.
    ///
    /// A persisted selection still present in the token is kept; otherwise the
    /// first organization becomes current and is persisted. With no
    /// organizations at all, any stored selection is cleared.
    pub fn initialize(&self, token: &str) -> Result<TenantState, AppError> {
        let available = resolve_organizations(token);
        let Some(first) = available.first().cloned() else {
            self.clear()?;
            return Err(AppError::NoOrganizations);
        };

        let current = match self.current() {
            Some(stored) => match available.iter().find(|org| org.id == stored.id) {
                Some(org) => org.clone(),
                None => {
                    tracing::info!(
                        stale = %stored.id,
                        selected = %first.id,
                        "Stored organization no longer granted, selecting first available"
                    );
                    self.set_current(&first)?;
                    first
                }
            },
            None => {
                self.set_current(&first)?;
                first
            }
        };

        Ok(TenantState { available, current })
    }

    pub fn available(&self, token: &str) -> Vec<Organization> {
        resolve_organizations(token)
    }

    pub fn current(&self) -> Option<Organization> {
        let raw = self.store.get(CURRENT_ORGANIZATION_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(org) => Some(org),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable stored organization");
                None
            }
        }
    }

    /// Id for the `X-Organization-Id` header.
    pub fn organization_id(&self) -> Result<String, AppError> {
        self.current()
            .map(|org| org.id)
            .ok_or(AppError::NoOrganization)
    }

    pub fn set_current(&self, organization: &Organization) -> Result<(), AppError> {
        let json = serde_json::to_string(organization)?;
        self.store.set(CURRENT_ORGANIZATION_KEY, &json)?;
        self.notify(TenantEvent::Changed(organization.clone()));
        Ok(())
    }

    /// Select the organization with `id` if the token grants it.
    pub fn select(&self, token: &str, id: &str) -> Result<Organization, AppError> {
        let organization = resolve_organizations(token)
            .into_iter()
            .find(|org| org.id == id)
            .ok_or(AppError::NoOrganization)?;
        self.set_current(&organization)?;
        Ok(organization)
    }

    pub fn clear(&self) -> Result<(), AppError> {
        self.store.remove(CURRENT_ORGANIZATION_KEY)?;
        self.notify(TenantEvent::Cleared);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TenantEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: TenantEvent) {
        // No subscribers is normal outside interactive use.
        if self.events.send(event).is_err() {
            tracing::debug!("No tenant subscribers to notify");
        }
    }
}
