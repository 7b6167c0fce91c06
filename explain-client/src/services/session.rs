//! Session context: the token store, tenant selection and session events
//! for one signed-in user, constructed explicitly and passed to consumers.

use crate::services::local_store::LocalStore;
use crate::services::tenant::TenantSelector;
use crate::services::token_store::TokenStore;
use crate::utils::clock::Clock;
use explain_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
    /// Credentials were found invalid; the user must sign in again.
    Expired { reason: String },
}

#[derive(Clone)]
pub struct Session {
    tokens: TokenStore,
    tenants: TenantSelector,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            tokens: TokenStore::new(store.clone()),
            tenants: TenantSelector::new(store),
            events,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn tenants(&self) -> &TenantSelector {
        &self.tenants
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn notify(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("No session subscribers to notify");
        }
    }

    /// Clear credentials and tenant selection, then signal `Expired`.
    ///
    /// Clearing is best-effort: a failure to remove persisted state is
    /// logged and the event is still sent.
    pub fn invalidate(&self, reason: &str) {
        tracing::warn!(reason = %reason, "Invalidating session");
        metrics::counter!("explain_session_invalidations_total").increment(1);

        if let Err(e) = self.tokens.clear() {
            tracing::error!(error = %e, "Failed to clear stored credentials");
        }
        if let Err(e) = self.tenants.clear() {
            tracing::error!(error = %e, "Failed to clear current organization");
        }

        self.notify(SessionEvent::Expired {
            reason: reason.to_string(),
        });
    }

    /// Explicit sign-out.
    pub fn end(&self) -> Result<(), AppError> {
        self.tokens.clear()?;
        self.tenants.clear()?;
        self.notify(SessionEvent::LoggedOut);
        Ok(())
    }
}

/// Periodically checks token expiry and invalidates the session once the
/// stored token has expired.
pub struct ExpiryWatcher;

impl ExpiryWatcher {
    /// Spawn the check loop. Each tick re-reads token presence, so a login or
    /// logout racing with the timer is observed at the next tick.
    pub fn spawn(
        session: Session,
        clock: Arc<dyn Clock>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("Token expiry watcher stopped");
                        break;
                    }
                    _ = clock.sleep(interval) => {}
                }

                if cancel.is_cancelled() {
                    break;
                }

                Self::check(&session, clock.as_ref());
            }
        })
    }

    /// One expiry check. Returns `true` if the session was invalidated.
    pub fn check(session: &Session, clock: &dyn Clock) -> bool {
        if !session.tokens().has_token() {
            return false;
        }

        if session.tokens().is_expired(clock.now()) {
            session.invalidate("Token expired");
            return true;
        }

        false
    }
}
