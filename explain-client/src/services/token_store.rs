use crate::models::{RememberedCredentials, StoredCredentialRecord, UserProfile};
use crate::services::local_store::{LocalStore, CREDENTIALS_KEY, REMEMBERED_CREDENTIALS_KEY};
use crate::utils::jwt::{decode_claims, Claims, DecodedToken};
use chrono::{DateTime, Utc};
use explain_core::error::AppError;
use std::sync::Arc;

/// Holds the identity token and its federation parameters.
///
/// Nothing is cached: every read goes back to the local store so a logout or
/// invalidation on another code path is observed immediately.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn LocalStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub fn save(&self, record: &StoredCredentialRecord) -> Result<(), AppError> {
        let json = serde_json::to_string(record)?;
        self.store.set(CREDENTIALS_KEY, &json)
    }

    pub fn record(&self) -> Result<StoredCredentialRecord, AppError> {
        let raw = self.store.get(CREDENTIALS_KEY).ok_or_else(|| {
            AppError::Unauthenticated(anyhow::anyhow!("No credentials found. Please log in."))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            AppError::Unauthenticated(anyhow::anyhow!("Stored credentials are unreadable: {}", e))
        })
    }

    pub fn id_token(&self) -> Result<String, AppError> {
        self.record()?.id_token.ok_or_else(|| {
            AppError::Unauthenticated(anyhow::anyhow!(
                "No ID token found in stored credentials."
            ))
        })
    }

    /// `true` when a record with an id token is stored, expired or not.
    pub fn has_token(&self) -> bool {
        self.id_token().is_ok()
    }

    pub fn claims(&self) -> Result<Claims, AppError> {
        match decode_claims(&self.id_token()?) {
            DecodedToken::Valid(claims) => Ok(claims),
            DecodedToken::Malformed(reason) => Err(AppError::Unauthenticated(anyhow::anyhow!(
                "Stored ID token is malformed: {}",
                reason
            ))),
        }
    }

    /// Missing, malformed and expiry-less tokens all count as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.claims() {
            Ok(claims) => claims.is_expired_at(now),
            Err(_) => true,
        }
    }

    pub fn profile(&self) -> Result<UserProfile, AppError> {
        let claims = self.claims()?;
        let email = claims.email.unwrap_or_default();
        let name = claims
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.clone());
        Ok(UserProfile { name, email })
    }

    pub fn clear(&self) -> Result<(), AppError> {
        self.store.remove(CREDENTIALS_KEY)
    }

    pub fn remember_email(&self, email: &str) -> Result<(), AppError> {
        let json = serde_json::to_string(&RememberedCredentials {
            email: email.to_string(),
        })?;
        self.store.set(REMEMBERED_CREDENTIALS_KEY, &json)
    }

    pub fn remembered_email(&self) -> Option<String> {
        let raw = self.store.get(REMEMBERED_CREDENTIALS_KEY)?;
        serde_json::from_str::<RememberedCredentials>(&raw)
            .ok()
            .map(|r| r.email)
    }

    pub fn forget_email(&self) -> Result<(), AppError> {
        self.store.remove(REMEMBERED_CREDENTIALS_KEY)
    }
}
