// Sign-in and role checks.
//
// Identities come from an OAuth provider spoken to over HTTPS. The app keeps
// its own `app_users` table mapping each identity to a role; that row, not
// the provider, decides what a session may do.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gavel_core::config::Config;
use gavel_core::db::{Database, DbError};
use gavel_core::model::{AppUser, NewAppUser, Provider, Role};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Sessions and guards
// ---------------------------------------------------------------------------

/// A signed-in user together with the role stored for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl Session {
    pub fn from_user(user: &AppUser) -> Self {
        Self {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Every role may watch the auction.
    pub fn can_view(&self) -> bool {
        matches!(self.role, Role::Admin | Role::User | Role::Viewer)
    }
}

/// Outcome of a route guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Guard {
    Allow,
    /// Not signed in: send the user to the login page, then back here.
    RedirectToLogin { return_url: String },
    /// Signed in but lacking the role.
    Forbidden,
}

pub fn require_authenticated(session: Option<&Session>, return_url: &str) -> Guard {
    match session {
        Some(s) if s.can_view() => Guard::Allow,
        Some(_) => Guard::Forbidden,
        None => Guard::RedirectToLogin {
            return_url: return_url.to_string(),
        },
    }
}

pub fn require_admin(session: Option<&Session>, return_url: &str) -> Guard {
    match session {
        Some(s) if s.is_admin() => Guard::Allow,
        Some(s) => {
            warn!(email = %s.email, return_url, "admin role required");
            Guard::Forbidden
        }
        None => Guard::RedirectToLogin {
            return_url: return_url.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Errors and provider payloads
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("sign-in is not configured")]
    Disabled,

    #[error("identity request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid identity provider URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppMetadata {
    #[serde(default)]
    pub provider: Option<String>,
}

/// The identity as the provider reports it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IdentityUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub app_metadata: AppMetadata,
}

impl IdentityUser {
    pub fn provider(&self) -> Provider {
        Provider::parse(self.app_metadata.provider.as_deref().unwrap_or("email"))
    }
}

/// Tokens issued after a successful sign-in.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: IdentityUser,
}

fn default_token_type() -> String {
    "bearer".into()
}

/// Error body the provider returns; the message sits under one of several
/// keys depending on the endpoint.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self, status: StatusCode) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| status.to_string())
    }
}

// ---------------------------------------------------------------------------
// Provider client
// ---------------------------------------------------------------------------

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// False when sign-in must go through the local users table instead.
    fn is_enabled(&self) -> bool {
        true
    }

    /// URL that starts the OAuth flow for `provider`.
    fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<Url, IdentityError>;

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<AuthSession, IdentityError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, IdentityError>;

    async fn get_user(&self, access_token: &str) -> Result<IdentityUser, IdentityError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    async fn reset_password(&self, email: &str) -> Result<(), IdentityError>;
}

/// HTTPS client for the provider's `/auth/v1` endpoints.
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
}

impl ProviderClient {
    pub fn new(base_url: &str, anon_key: String) -> Result<Self, IdentityError> {
        let base_url = Url::parse(base_url).map_err(|e| IdentityError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            anon_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.base_url
            .join(path)
            .map_err(|e| IdentityError::InvalidUrl(e.to_string()))
    }

    async fn post_token(&self, grant_type: &str, body: serde_json::Value) -> Result<AuthSession, IdentityError> {
        let mut url = self.endpoint("/auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }
}

/// Turn a non-2xx response into `IdentityError::Rejected`.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, IdentityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: ErrorBody = response.json().await.unwrap_or_default();
    let message = body.into_message(status);
    debug!(status = status.as_u16(), %message, "identity provider error");
    Err(IdentityError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl IdentityProvider for ProviderClient {
    fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<Url, IdentityError> {
        let mut url = self.endpoint("/auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<AuthSession, IdentityError> {
        self.post_token(
            "pkce",
            serde_json::json!({ "auth_code": code, "code_verifier": verifier }),
        )
        .await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, IdentityError> {
        self.post_token(
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn get_user(&self, access_token: &str) -> Result<IdentityUser, IdentityError> {
        let response = self
            .http
            .get(self.endpoint("/auth/v1/user")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let response = self
            .http
            .post(self.endpoint("/auth/v1/logout")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn reset_password(&self, email: &str) -> Result<(), IdentityError> {
        let response = self
            .http
            .post(self.endpoint("/auth/v1/recover")?)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// Either a configured provider client or nothing at all.
pub enum IdentityClient {
    /// Provider URL and anon key are configured.
    Active(ProviderClient),
    /// Sign-in through the provider is turned off.
    Disabled,
}

impl IdentityClient {
    /// `Active` when identity is enabled and an anon key is present.
    pub fn from_config(config: &Config) -> Self {
        if !config.identity.enabled {
            return IdentityClient::Disabled;
        }
        match &config.credentials.anon_key {
            Some(key) if !key.is_empty() => {
                match ProviderClient::new(&config.identity.provider_url, key.clone()) {
                    Ok(client) => IdentityClient::Active(client),
                    Err(e) => {
                        warn!("identity provider disabled: {}", e);
                        IdentityClient::Disabled
                    }
                }
            }
            _ => IdentityClient::Disabled,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, IdentityClient::Active(_))
    }

    fn active(&self) -> Result<&ProviderClient, IdentityError> {
        match self {
            IdentityClient::Active(client) => Ok(client),
            IdentityClient::Disabled => Err(IdentityError::Disabled),
        }
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    fn is_enabled(&self) -> bool {
        self.is_active()
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<Url, IdentityError> {
        self.active()?.authorize_url(provider, redirect_to)
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<AuthSession, IdentityError> {
        self.active()?.exchange_code(code, verifier).await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, IdentityError> {
        self.active()?.sign_in_with_password(email, password).await
    }

    async fn get_user(&self, access_token: &str) -> Result<IdentityUser, IdentityError> {
        self.active()?.get_user(access_token).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        self.active()?.sign_out(access_token).await
    }

    async fn reset_password(&self, email: &str) -> Result<(), IdentityError> {
        self.active()?.reset_password(email).await
    }
}

// ---------------------------------------------------------------------------
// Session resolution
// ---------------------------------------------------------------------------

fn is_listed(email: &str, admin_emails: &[String]) -> bool {
    let email = email.trim();
    admin_emails.iter().any(|a| a.trim().eq_ignore_ascii_case(email))
}

/// Record a provider identity in `app_users` and build its session. New
/// users get `user`, or `admin` when their email is in `admin_emails`; an
/// existing user keeps the role already stored.
pub fn resolve_session(
    db: &Database,
    user: &IdentityUser,
    admin_emails: &[String],
) -> Result<Session, IdentityError> {
    let role = if is_listed(&user.email, admin_emails) {
        Role::Admin
    } else {
        Role::User
    };
    let stored = db.upsert_user(&NewAppUser {
        user_id: user.id.clone(),
        email: user.email.clone(),
        provider: user.provider(),
        email_confirmed: user.email_confirmed_at.is_some(),
        role,
    })?;
    db.record_sign_in(&stored.user_id, Utc::now())?;

    info!(email = %stored.email, role = %stored.role, "session resolved");
    Ok(Session::from_user(&stored))
}

/// Session for a desk running without an identity provider. Known emails
/// get their stored role; an unknown email listed in `admin_emails` is
/// registered as admin. Anyone else gets no session.
pub fn local_session(
    db: &Database,
    email: &str,
    admin_emails: &[String],
) -> Result<Option<Session>, IdentityError> {
    let email = email.trim();
    if email.is_empty() {
        return Ok(None);
    }
    if let Some(user) = db.get_user_by_email(email)? {
        db.record_sign_in(&user.user_id, Utc::now())?;
        return Ok(Some(Session::from_user(&user)));
    }
    if !is_listed(email, admin_emails) {
        return Ok(None);
    }
    let local = IdentityUser {
        id: format!("local:{}", email.to_lowercase()),
        email: email.to_string(),
        email_confirmed_at: None,
        last_sign_in_at: None,
        app_metadata: AppMetadata {
            provider: Some("email".into()),
        },
    };
    resolve_session(db, &local, admin_emails).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_core::config::{AuctionDefaults, CredentialsConfig, IdentityConfig};

    fn session(role: Role) -> Session {
        Session {
            user_id: "u1".into(),
            email: "ops@example.com".into(),
            role,
        }
    }

    fn identity(id: &str, email: &str) -> IdentityUser {
        IdentityUser {
            id: id.into(),
            email: email.into(),
            email_confirmed_at: Some(Utc::now()),
            last_sign_in_at: None,
            app_metadata: AppMetadata {
                provider: Some("google".into()),
            },
        }
    }

    fn config(enabled: bool, anon_key: Option<&str>) -> Config {
        Config {
            auction: AuctionDefaults::default(),
            identity: IdentityConfig {
                enabled,
                provider_url: "https://auth.example.com".into(),
                redirect_url: "http://localhost:9100/auth/callback".into(),
                default_provider: "google".into(),
                admin_emails: vec![],
            },
            credentials: CredentialsConfig {
                anon_key: anon_key.map(str::to_string),
            },
            ws_port: 9100,
            db_path: ":memory:".into(),
        }
    }

    #[test]
    fn guards() {
        assert_eq!(
            require_authenticated(None, "/auction"),
            Guard::RedirectToLogin {
                return_url: "/auction".into()
            }
        );
        assert_eq!(
            require_authenticated(Some(&session(Role::Viewer)), "/auction"),
            Guard::Allow
        );
        assert_eq!(
            require_admin(Some(&session(Role::User)), "/players"),
            Guard::Forbidden
        );
        assert_eq!(
            require_admin(None, "/players"),
            Guard::RedirectToLogin {
                return_url: "/players".into()
            }
        );
        assert_eq!(require_admin(Some(&session(Role::Admin)), "/players"), Guard::Allow);
    }

    #[test]
    fn role_checks() {
        assert!(session(Role::Admin).is_admin());
        assert!(!session(Role::Viewer).is_admin());
        assert!(session(Role::Viewer).can_view());
    }

    #[test]
    fn client_is_disabled_without_key_or_flag() {
        assert!(!IdentityClient::from_config(&config(false, Some("key"))).is_active());
        assert!(!IdentityClient::from_config(&config(true, None)).is_active());
        assert!(!IdentityClient::from_config(&config(true, Some(""))).is_active());
        assert!(IdentityClient::from_config(&config(true, Some("key"))).is_active());
    }

    #[tokio::test]
    async fn disabled_client_refuses_every_call() {
        let client = IdentityClient::Disabled;
        assert!(matches!(
            client.get_user("token").await,
            Err(IdentityError::Disabled)
        ));
        assert!(matches!(
            client.authorize_url("google", "http://localhost"),
            Err(IdentityError::Disabled)
        ));
    }

    #[test]
    fn authorize_url_encodes_redirect() {
        let client = ProviderClient::new("https://auth.example.com", "key".into()).unwrap();
        let url = client
            .authorize_url("google", "http://localhost:9100/auth/callback?next=/auction")
            .unwrap();

        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("provider".to_string(), "google".to_string()),
                (
                    "redirect_to".to_string(),
                    "http://localhost:9100/auth/callback?next=/auction".to_string()
                ),
            ]
        );
    }

    #[test]
    fn auth_session_parses_provider_payload() {
        let json = r#"{
            "access_token": "abc",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "def",
            "user": {
                "id": "0b7c",
                "email": "ops@example.com",
                "email_confirmed_at": "2026-03-01T10:00:00Z",
                "app_metadata": { "provider": "github", "providers": ["github"] },
                "aud": "authenticated"
            }
        }"#;
        let session: AuthSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.access_token, "abc");
        assert_eq!(session.user.provider(), Provider::Github);
        assert!(session.user.email_confirmed_at.is_some());
    }

    #[test]
    fn error_body_prefers_description() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#)
                .unwrap();
        assert_eq!(
            body.into_message(StatusCode::BAD_REQUEST),
            "Invalid login credentials"
        );
        assert_eq!(
            ErrorBody::default().into_message(StatusCode::UNAUTHORIZED),
            "401 Unauthorized"
        );
    }

    #[test]
    fn resolve_session_bootstraps_admins_and_keeps_roles() {
        let db = Database::open(":memory:").unwrap();
        let admins = vec!["Boss@Example.com".to_string()];

        let boss = resolve_session(&db, &identity("u-boss", "boss@example.com"), &admins).unwrap();
        assert!(boss.is_admin());

        let fan = resolve_session(&db, &identity("u-fan", "fan@example.com"), &admins).unwrap();
        assert_eq!(fan.role, Role::User);

        db.update_user_role("u-fan", Role::Viewer).unwrap();
        let again = resolve_session(&db, &identity("u-fan", "fan@example.com"), &admins).unwrap();
        assert_eq!(again.role, Role::Viewer);

        let stored = db.get_user("u-boss").unwrap();
        assert!(stored.last_sign_in_at.is_some());
        assert!(stored.email_confirmed);
        assert_eq!(stored.provider, Provider::Google);
    }

    #[test]
    fn local_session_only_for_known_or_listed() {
        let db = Database::open(":memory:").unwrap();
        let admins = vec!["desk@example.com".to_string()];

        assert_eq!(local_session(&db, "stranger@example.com", &admins).unwrap(), None);
        assert_eq!(local_session(&db, "  ", &admins).unwrap(), None);

        let desk = local_session(&db, "desk@example.com", &admins).unwrap().unwrap();
        assert!(desk.is_admin());
        assert_eq!(desk.user_id, "local:desk@example.com");

        let again = local_session(&db, "DESK@example.com", &[]).unwrap().unwrap();
        assert_eq!(again.user_id, desk.user_id);
    }

    #[test]
    fn provider_sign_in_takes_over_a_local_user() {
        let db = Database::open(":memory:").unwrap();
        let admins = vec!["desk@example.com".to_string()];
        local_session(&db, "desk@example.com", &admins).unwrap().unwrap();
        db.update_user_role("local:desk@example.com", Role::Viewer).unwrap();

        let session =
            resolve_session(&db, &identity("provider-uuid-1", "desk@example.com"), &admins).unwrap();

        assert_eq!(session.user_id, "provider-uuid-1");
        assert_eq!(session.role, Role::Viewer);
        assert_eq!(db.list_users().unwrap().len(), 1);

        let back = local_session(&db, "desk@example.com", &admins).unwrap().unwrap();
        assert_eq!(back.user_id, "provider-uuid-1");
    }
}
