use crate::api::{
    ensure_success, read_json, ApiClient, ApiError, ApiRequest, ErrorBody, LoginResponse,
    TelegramLinkCode,
};
use crate::notify::{Notification, NotificationSink};
use crate::session::token_store::TokenStore;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;

/// Shown once per forced logout.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired, please log in again";

#[derive(Debug, Error)]
pub enum AuthError {
    /// The backend refused the credentials. Deliberately does not say which
    /// field was wrong.
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Login failed: {0}")]
    Request(#[from] ApiError),
}

#[derive(Debug, Error)]
pub enum RegisterError {
    /// Field-level validation messages, keyed by field name.
    #[error("{}", describe_fields(.0))]
    Fields(BTreeMap<String, String>),
    #[error("Registration failed: {}", .message.as_deref().unwrap_or("server rejected the request"))]
    Rejected {
        status: u16,
        message: Option<String>,
    },
    #[error("Registration failed: {0}")]
    Request(#[from] ApiError),
}

fn describe_fields(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Whether a credential is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
}

/// The live credential plus the generation it was established in.
///
/// A 401 only ends the session when it was caused by the same generation,
/// so several requests failing together produce a single expiry.
struct Session {
    token: SecretString,
    epoch: u64,
}

/// Owns the session token and gates every authenticated request.
pub struct SessionManager {
    api: ApiClient,
    tokens: Arc<dyn TokenStore>,
    sink: Arc<dyn NotificationSink>,
    session: Mutex<Option<Session>>,
    epochs: AtomicU64,
    state: watch::Sender<SessionState>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_url", &self.api.base_url().as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        api: ApiClient,
        tokens: Arc<dyn TokenStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::LoggedOut);
        Self {
            api,
            tokens,
            sink,
            session: Mutex::new(None),
            epochs: AtomicU64::new(0),
            state,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_logged_in(&self) -> bool {
        self.lock_session().is_some()
    }

    /// Observe login/logout transitions, including forced expiry.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<(SecretString, u64)> {
        self.lock_session()
            .as_ref()
            .map(|s| (s.token.clone(), s.epoch))
    }

    fn establish(&self, token: SecretString) {
        let epoch = self.epochs.fetch_add(1, Ordering::Relaxed) + 1;
        *self.lock_session() = Some(Session { token, epoch });
        self.state.send_replace(SessionState::LoggedIn);
        tracing::info!(epoch, "Session established");
    }

    /// Drop the session and the persisted token without telling the user.
    fn discard(&self) {
        self.lock_session().take();
        if let Err(e) = self.tokens.clear() {
            tracing::warn!(error = %e, "Failed to clear stored token");
        }
        self.state.send_if_modified(|state| {
            let changed = *state != SessionState::LoggedOut;
            *state = SessionState::LoggedOut;
            changed
        });
    }

    /// End the session started in `epoch` after the backend rejected it.
    fn expire(&self, epoch: u64) {
        let expired = {
            let mut session = self.lock_session();
            if session.as_ref().is_some_and(|s| s.epoch == epoch) {
                *session = None;
                true
            } else {
                false
            }
        };

        if !expired {
            tracing::debug!(epoch, "Ignoring 401 for a session that already ended");
            return;
        }

        tracing::info!(epoch, "Session expired, logging out");
        if let Err(e) = self.tokens.clear() {
            tracing::warn!(error = %e, "Failed to clear stored token");
        }
        self.state.send_replace(SessionState::LoggedOut);
        self.sink.notify(Notification::error(SESSION_EXPIRED_MESSAGE));
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Exchange credentials for a token, then persist it.
    ///
    /// Failure leaves no session behind and emits one error notification.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<SecretString, AuthError> {
        let request = ApiRequest::post("api/login").with_body(serde_json::json!({
            "username": username,
            "password": password.expose_secret(),
        }));

        match self.request_token(&request).await {
            Ok(token) => {
                self.establish(token.clone());
                if let Err(e) = self.tokens.write(&token) {
                    tracing::warn!(error = %e, "Failed to persist session token");
                }
                self.sink.notify(Notification::success("Login successful"));
                Ok(token)
            }
            Err(e) => {
                // Memory only; the persisted token is left alone.
                if self.lock_session().take().is_some() {
                    self.state.send_replace(SessionState::LoggedOut);
                }
                let message = match &e {
                    AuthError::InvalidCredentials => e.to_string(),
                    AuthError::Request(_) => "Network error, please try again".to_string(),
                };
                tracing::info!(error = %e, "Login failed");
                self.sink.notify(Notification::error(message));
                Err(e)
            }
        }
    }

    async fn request_token(&self, request: &ApiRequest) -> Result<SecretString, AuthError> {
        let response = self.api.send(request, None).await?;
        if !response.status().is_success() {
            tracing::debug!(status = response.status().as_u16(), "Login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let body: LoginResponse = read_json(response).await?;
        if body.token.is_empty() {
            return Err(AuthError::Request(ApiError::Decode(
                "login response carried an empty token".to_string(),
            )));
        }
        Ok(SecretString::from(body.token))
    }

    /// Create an account. Does not log in.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<(), RegisterError> {
        let request = ApiRequest::post("api/register").with_body(serde_json::json!({
            "username": username,
            "email": email,
            "password": password.expose_secret(),
        }));

        let result = self.submit_registration(&request).await;
        match &result {
            Ok(()) => {
                tracing::info!(username, "Registered account");
                self.sink.notify(Notification::success(
                    "Registration successful, you can now log in",
                ));
            }
            Err(e) => {
                tracing::info!(error = %e, "Registration failed");
                self.sink.notify(Notification::error(e.to_string()));
            }
        }
        result
    }

    async fn submit_registration(&self, request: &ApiRequest) -> Result<(), RegisterError> {
        let response = self.api.send(request, None).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // Plain-text bodies carry no structure; fall back to the status.
        let body: ErrorBody = read_json(response).await.unwrap_or_default();
        match body.details {
            Some(details) if !details.is_empty() => Err(RegisterError::Fields(details)),
            _ => Err(RegisterError::Rejected {
                status: status.as_u16(),
                message: body.error,
            }),
        }
    }

    /// Restore the persisted session at startup.
    ///
    /// Any failure, network failure included, discards the stored token.
    pub async fn verify_session(&self) -> bool {
        let token = match self.tokens.read() {
            Ok(Some(token)) => token,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored token");
                return false;
            }
        };

        let verified = match self
            .api
            .send(&ApiRequest::get("api/verify-token"), Some(&token))
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::info!(
                    status = response.status().as_u16(),
                    "Stored session rejected"
                );
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not verify stored session");
                false
            }
        };

        if verified {
            self.establish(token);
        } else {
            self.discard();
        }
        verified
    }

    /// Send `request` with the active token.
    ///
    /// A 401 ends the session (once, however many requests see it) and is
    /// reported as [`ApiError::AuthExpired`]. Other statuses are returned
    /// untouched.
    pub async fn authorized_request(
        &self,
        request: &ApiRequest,
    ) -> Result<reqwest::Response, ApiError> {
        let Some((token, epoch)) = self.current() else {
            return Err(ApiError::NotLoggedIn);
        };

        let response = self.api.send(request, Some(&token)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.expire(epoch);
            return Err(ApiError::AuthExpired);
        }
        Ok(response)
    }

    pub fn logout(&self) {
        self.discard();
        tracing::info!("Logged out");
    }

    /// Request a one-time code for linking the account to the Telegram bot.
    pub async fn telegram_link_code(&self) -> Result<TelegramLinkCode, ApiError> {
        let result = async {
            let response = self
                .authorized_request(&ApiRequest::post("api/telegram/link-code"))
                .await?;
            read_json::<TelegramLinkCode>(ensure_success(response)?).await
        }
        .await;

        match &result {
            Ok(link) => self.sink.notify(Notification::info(format!(
                "Send /link {} to the bot within {} minutes",
                link.code,
                (link.expires_in / 60).max(1)
            ))),
            Err(e) if e.is_auth() => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create Telegram link code");
                self.sink
                    .notify(Notification::error("Failed to generate link code"));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemorySink;
    use crate::session::MemoryTokenStore;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        manager: SessionManager,
        tokens: Arc<MemoryTokenStore>,
        sink: Arc<MemorySink>,
    }

    fn fixture(server: &MockServer, tokens: MemoryTokenStore) -> Fixture {
        let api = ApiClient::new(
            Url::parse(&server.uri()).unwrap(),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        let tokens = Arc::new(tokens);
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new(api, tokens.clone(), sink.clone());
        Fixture {
            manager,
            tokens,
            sink,
        }
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[tokio::test]
    async fn test_login_establishes_and_persists_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(body_json(serde_json::json!({"username": "alice", "password": "Secret1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "jwt-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::new());
        let mut state = f.manager.subscribe();

        let token = f.manager.login("alice", &secret("Secret1")).await.unwrap();
        assert_eq!(token.expose_secret(), "jwt-1");
        assert!(f.manager.is_logged_in());
        assert!(f.tokens.has_token());
        assert!(state.has_changed().unwrap());
        assert_eq!(*state.borrow_and_update(), SessionState::LoggedIn);
        assert_eq!(f.sink.messages(), vec!["Login successful".to_string()]);
    }

    #[tokio::test]
    async fn test_login_rejection_is_generic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid credentials"))
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::new());
        let result = f.manager.login("alice", &secret("wrong")).await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        assert!(!f.manager.is_logged_in());
        assert!(!f.tokens.has_token());
        assert_eq!(
            f.sink.messages(),
            vec!["Invalid username or password".to_string()]
        );
    }

    #[tokio::test]
    async fn test_login_rejection_keeps_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::with_token("still-valid"));
        let mut state = f.manager.subscribe();
        let result = f.manager.login("alice", &secret("typo")).await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        assert!(!f.manager.is_logged_in());
        assert!(f.tokens.has_token());
        assert!(!state.has_changed().unwrap());
        assert_eq!(f.manager.state(), SessionState::LoggedOut);
    }

    #[tokio::test]
    async fn test_register_surfaces_field_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/register"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "Validation failed",
                "details": {
                    "username": "Username must be at least 3 characters",
                    "email": "Invalid email address"
                }
            })))
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::new());
        let err = f
            .manager
            .register("al", "nope", &secret("Secret1"))
            .await
            .unwrap_err();

        let RegisterError::Fields(fields) = &err else {
            panic!("expected field errors, got {err:?}");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(
            err.to_string(),
            "email: Invalid email address; username: Username must be at least 3 characters"
        );
        assert_eq!(f.sink.count_containing("Invalid email address"), 1);
    }

    #[tokio::test]
    async fn test_register_plain_failure_is_generic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/register"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Registration failed\n"))
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::new());
        let err = f
            .manager
            .register("alice", "a@example.com", &secret("Secret1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegisterError::Rejected {
                status: 500,
                message: None
            }
        ));
    }

    #[tokio::test]
    async fn test_register_success_notifies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"user_id": 9})))
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::new());
        f.manager
            .register("alice", "a@example.com", &secret("Secret1"))
            .await
            .unwrap();
        assert!(!f.manager.is_logged_in());
        assert_eq!(f.sink.count_containing("Registration successful"), 1);
    }

    #[tokio::test]
    async fn test_verify_session_restores_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/verify-token"))
            .and(header("authorization", "Bearer stored"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::with_token("stored"));
        assert!(f.manager.verify_session().await);
        assert!(f.manager.is_logged_in());
        assert_eq!(f.manager.state(), SessionState::LoggedIn);
    }

    #[tokio::test]
    async fn test_verify_session_without_token_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::new());
        assert!(!f.manager.verify_session().await);
        assert!(f.sink.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_verify_session_discards_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/verify-token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::with_token("stale"));
        assert!(!f.manager.verify_session().await);
        assert!(!f.manager.is_logged_in());
        assert!(!f.tokens.has_token());
        assert!(f.sink.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_authorized_request_without_session_is_local() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::new());
        let result = f.manager.authorized_request(&ApiRequest::get("api/sites")).await;
        assert!(matches!(result, Err(ApiError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn test_stale_epoch_does_not_end_new_session() {
        let server = MockServer::start().await;
        let f = fixture(&server, MemoryTokenStore::new());

        f.manager.establish(secret("first"));
        let (_, old_epoch) = f.manager.current().unwrap();
        f.manager.establish(secret("second"));

        f.manager.expire(old_epoch);
        assert!(f.manager.is_logged_in());
        assert!(f.sink.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_logout_is_silent_and_local() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::with_token("tok"));
        f.manager.establish(secret("tok"));
        f.manager.logout();

        assert!(!f.manager.is_logged_in());
        assert!(!f.tokens.has_token());
        assert_eq!(f.manager.state(), SessionState::LoggedOut);
        assert!(f.sink.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_telegram_link_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/telegram/link-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "abc123",
                "expires_in": 600,
                "message": "Send /link abc123 to the bot"
            })))
            .mount(&server)
            .await;

        let f = fixture(&server, MemoryTokenStore::new());
        f.manager.establish(secret("tok"));

        let link = f.manager.telegram_link_code().await.unwrap();
        assert_eq!(link.code, "abc123");
        assert_eq!(
            f.sink.messages(),
            vec!["Send /link abc123 to the bot within 10 minutes".to_string()]
        );
    }
}
