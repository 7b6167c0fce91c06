use crate::config::CognitoSettings;
use crate::models::{StoredCredentialRecord, UserProfile};
use crate::services::aws_credentials::load_sdk_config;
use crate::services::session::{Session, SessionEvent};
use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cognitoidentityprovider::types::{AuthFlowType, AuthenticationResultType, ChallengeNameType};
use aws_sdk_cognitoidentityprovider::Client as UserPoolClient;
use explain_core::error::AppError;
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;

/// State needed to answer a `NEW_PASSWORD_REQUIRED` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPasswordChallenge {
    pub username: String,
    pub session: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated { id_token: String },
    NewPasswordRequired(NewPasswordChallenge),
}

/// User-pool password authentication.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, email: &str, password: &Secret<String>) -> Result<AuthOutcome, AppError>;

    async fn complete_new_password(
        &self,
        challenge: &NewPasswordChallenge,
        new_password: &Secret<String>,
    ) -> Result<AuthOutcome, AppError>;
}

pub struct CognitoIdentityProvider {
    client: UserPoolClient,
    client_id: String,
}

impl CognitoIdentityProvider {
    pub async fn new(settings: &CognitoSettings) -> Self {
        let sdk_config = load_sdk_config(&settings.region).await;
        Self::from_client(UserPoolClient::new(&sdk_config), settings.client_id.clone())
    }

    pub fn from_client(client: UserPoolClient, client_id: String) -> Self {
        Self { client, client_id }
    }
}

fn auth_failed<E, R>(fallback: &str, err: SdkError<E, R>) -> AppError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    tracing::warn!(
        code = err.code().unwrap_or(""),
        error = %DisplayErrorContext(&err),
        "User pool rejected the request"
    );
    AppError::AuthFailed(err.message().unwrap_or(fallback).to_string())
}

fn outcome(
    username: &str,
    challenge: Option<&ChallengeNameType>,
    session: Option<&str>,
    result: Option<&AuthenticationResultType>,
) -> Result<AuthOutcome, AppError> {
    if let Some(id_token) = result.and_then(|r| r.id_token()) {
        return Ok(AuthOutcome::Authenticated {
            id_token: id_token.to_string(),
        });
    }

    match (challenge, session) {
        (Some(ChallengeNameType::NewPasswordRequired), Some(session)) => {
            Ok(AuthOutcome::NewPasswordRequired(NewPasswordChallenge {
                username: username.to_string(),
                session: session.to_string(),
            }))
        }
        (Some(other), _) => Err(AppError::AuthFailed(format!(
            "Unsupported authentication challenge: {}",
            other.as_str()
        ))),
        (None, _) => Err(AppError::AuthFailed(
            "Authentication returned no identity token".to_string(),
        )),
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn authenticate(&self, email: &str, password: &Secret<String>) -> Result<AuthOutcome, AppError> {
        let output = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password.expose_secret())
            .send()
            .await
            .map_err(|e| auth_failed("Authentication failed", e))?;

        outcome(
            email,
            output.challenge_name(),
            output.session(),
            output.authentication_result(),
        )
    }

    async fn complete_new_password(
        &self,
        challenge: &NewPasswordChallenge,
        new_password: &Secret<String>,
    ) -> Result<AuthOutcome, AppError> {
        let output = self
            .client
            .respond_to_auth_challenge()
            .client_id(&self.client_id)
            .challenge_name(ChallengeNameType::NewPasswordRequired)
            .session(&challenge.session)
            .challenge_responses("USERNAME", &challenge.username)
            .challenge_responses("NEW_PASSWORD", new_password.expose_secret())
            .send()
            .await
            .map_err(|e| auth_failed("Failed to set new password", e))?;

        outcome(
            &challenge.username,
            output.challenge_name(),
            output.session(),
            output.authentication_result(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    SignedIn(UserProfile),
    NewPasswordRequired(NewPasswordChallenge),
}

/// Sign-in and sign-out on top of an [`IdentityProvider`] and a [`Session`].
#[derive(Clone)]
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    session: Session,
    cognito: CognitoSettings,
}

impl AuthService {
    pub fn new(provider: Arc<dyn IdentityProvider>, session: Session, cognito: CognitoSettings) -> Self {
        Self {
            provider,
            session,
            cognito,
        }
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &Secret<String>,
        remember: bool,
    ) -> Result<LoginOutcome, AppError> {
        let outcome = self.provider.authenticate(email, password).await.map_err(|e| {
            metrics::counter!("explain_logins_total", "outcome" => "failed").increment(1);
            e
        })?;

        if remember {
            self.session.tokens().remember_email(email)?;
        } else {
            self.session.tokens().forget_email()?;
        }

        self.finish(email, outcome)
    }

    #[tracing::instrument(skip(self, challenge, new_password), fields(username = %challenge.username))]
    pub async fn complete_new_password(
        &self,
        challenge: &NewPasswordChallenge,
        new_password: &Secret<String>,
    ) -> Result<LoginOutcome, AppError> {
        let outcome = self
            .provider
            .complete_new_password(challenge, new_password)
            .await?;
        self.finish(&challenge.username, outcome)
    }

    pub fn logout(&self) -> Result<(), AppError> {
        self.session.end()?;
        tracing::info!("Signed out");
        Ok(())
    }

    fn finish(&self, email: &str, outcome: AuthOutcome) -> Result<LoginOutcome, AppError> {
        let id_token = match outcome {
            AuthOutcome::NewPasswordRequired(challenge) => {
                tracing::info!(username = %challenge.username, "New password required");
                return Ok(LoginOutcome::NewPasswordRequired(challenge));
            }
            AuthOutcome::Authenticated { id_token } => id_token,
        };

        self.session.tokens().save(&StoredCredentialRecord {
            identity_pool_id: self.cognito.identity_pool_id.clone(),
            region: self.cognito.region.clone(),
            user_pool_id: self.cognito.user_pool_id.clone(),
            id_token: Some(id_token.clone()),
        })?;

        match self.session.tenants().initialize(&id_token) {
            Ok(state) => tracing::info!(
                organizations = state.available.len(),
                current = %state.current.id,
                "Organization selected"
            ),
            Err(AppError::NoOrganizations) => {
                tracing::warn!("Signed in user has no organizations")
            }
            Err(e) => return Err(e),
        }

        let mut profile = self.session.tokens().profile().unwrap_or_else(|_| UserProfile {
            name: String::new(),
            email: String::new(),
        });
        if profile.email.is_empty() {
            profile.email = email.to_string();
        }
        if profile.name.is_empty() {
            profile.name = profile.email.clone();
        }

        metrics::counter!("explain_logins_total", "outcome" => "signed_in").increment(1);
        tracing::info!(email = %profile.email, "Signed in");
        self.session.notify(SessionEvent::LoggedIn);
        Ok(LoginOutcome::SignedIn(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::local_store::MemoryLocalStore;
    use base64::{engine::general_purpose, Engine as _};
    use parking_lot::Mutex;

    struct StubProvider {
        outcome: Mutex<Option<Result<AuthOutcome, AppError>>>,
        final_token: String,
    }

    #[async_trait]
    impl IdentityProvider for StubProvider {
        async fn authenticate(&self, _email: &str, _password: &Secret<String>) -> Result<AuthOutcome, AppError> {
            self.outcome
                .lock()
                .take()
                .unwrap_or_else(|| Err(AppError::AuthFailed("no script".to_string())))
        }

        async fn complete_new_password(
            &self,
            _challenge: &NewPasswordChallenge,
            _new_password: &Secret<String>,
        ) -> Result<AuthOutcome, AppError> {
            Ok(AuthOutcome::Authenticated {
                id_token: self.final_token.clone(),
            })
        }
    }

    fn token(groups: &[&str]) -> String {
        let payload = serde_json::json!({
            "cognito:groups": groups,
            "email": "ana@acme.test",
            "exp": 4_102_444_800i64,
        });
        format!(
            "e30.{}.sig",
            general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    fn service(outcome: Result<AuthOutcome, AppError>, final_token: String) -> (AuthService, Session) {
        let session = Session::new(Arc::new(MemoryLocalStore::new()));
        let provider = Arc::new(StubProvider {
            outcome: Mutex::new(Some(outcome)),
            final_token,
        });
        let cognito = CognitoSettings {
            region: "us-east-1".to_string(),
            user_pool_id: "us-east-1_users".to_string(),
            client_id: "client".to_string(),
            identity_pool_id: "us-east-1:identity".to_string(),
        };
        (AuthService::new(provider, session.clone(), cognito), session)
    }

    fn password() -> Secret<String> {
        Secret::new("hunter2".to_string())
    }

    #[tokio::test]
    async fn login_persists_record_and_selects_organization() {
        let id_token = token(&["org-globex", "org-acme"]);
        let (auth, session) = service(
            Ok(AuthOutcome::Authenticated {
                id_token: id_token.clone(),
            }),
            String::new(),
        );
        let mut events = session.subscribe();

        let outcome = auth.login("ana@acme.test", &password(), true).await.unwrap();

        assert_eq!(
            outcome,
            LoginOutcome::SignedIn(UserProfile {
                name: "ana@acme.test".to_string(),
                email: "ana@acme.test".to_string(),
            })
        );
        let record = session.tokens().record().unwrap();
        assert_eq!(record.identity_pool_id, "us-east-1:identity");
        assert_eq!(record.id_token, Some(id_token));
        assert_eq!(session.tenants().organization_id().unwrap(), "acme");
        assert_eq!(
            session.tokens().remembered_email().as_deref(),
            Some("ana@acme.test")
        );
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedIn);
    }

    #[tokio::test]
    async fn login_without_organizations_still_signs_in() {
        let (auth, session) = service(
            Ok(AuthOutcome::Authenticated {
                id_token: token(&["admins"]),
            }),
            String::new(),
        );

        let outcome = auth.login("ana@acme.test", &password(), false).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::SignedIn(_)));
        assert!(session.tenants().current().is_none());
        assert!(session.tokens().remembered_email().is_none());
    }

    #[tokio::test]
    async fn new_password_challenge_is_completed() {
        let challenge = NewPasswordChallenge {
            username: "ana@acme.test".to_string(),
            session: "challenge-session".to_string(),
        };
        let (auth, session) = service(
            Ok(AuthOutcome::NewPasswordRequired(challenge.clone())),
            token(&["org-acme"]),
        );

        let outcome = auth.login("ana@acme.test", &password(), false).await.unwrap();
        assert_eq!(outcome, LoginOutcome::NewPasswordRequired(challenge.clone()));
        assert!(!session.tokens().has_token());

        let outcome = auth
            .complete_new_password(&challenge, &Secret::new("n3w-pass".to_string()))
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::SignedIn(_)));
        assert!(session.tokens().has_token());
    }

    #[tokio::test]
    async fn rejected_login_stores_nothing() {
        let (auth, session) = service(
            Err(AppError::AuthFailed("Incorrect username or password.".to_string())),
            String::new(),
        );

        let err = auth.login("ana@acme.test", &password(), true).await.unwrap_err();
        assert_eq!(err.to_string(), "Authentication failed: Incorrect username or password.");
        assert!(!session.tokens().has_token());
        assert!(session.tokens().remembered_email().is_none());
    }

    #[tokio::test]
    async fn login_without_organizations_drops_previous_selection() {
        let (auth, session) = service(
            Ok(AuthOutcome::Authenticated {
                id_token: token(&["admins"]),
            }),
            String::new(),
        );
        session
            .tenants()
            .set_current(&crate::models::Organization::from_id("acme"))
            .unwrap();

        let outcome = auth.login("ana@acme.test", &password(), false).await.unwrap();

        assert!(matches!(outcome, LoginOutcome::SignedIn(_)));
        assert!(matches!(
            session.tenants().organization_id(),
            Err(AppError::NoOrganization)
        ));
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let (auth, session) = service(
            Ok(AuthOutcome::Authenticated {
                id_token: token(&["org-acme"]),
            }),
            String::new(),
        );
        auth.login("ana@acme.test", &password(), false).await.unwrap();

        auth.logout().unwrap();
        assert!(!session.tokens().has_token());
        assert!(session.tenants().current().is_none());
    }
}
