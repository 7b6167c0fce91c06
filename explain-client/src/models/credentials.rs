use serde::{Deserialize, Serialize};

/// Serialized Token Store, kept under `cognitoCredentialsProvider`.
///
/// Everything except `id_token` comes from configuration; the record can be
/// rebuilt from the token alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentialRecord {
    pub identity_pool_id: String,
    pub region: String,
    pub user_pool_id: String,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl StoredCredentialRecord {
    /// Logins map key for identity-pool federation.
    pub fn login_provider(&self) -> String {
        format!(
            "cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }
}

/// Only the email is remembered; passwords are never written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RememberedCredentials {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
}
