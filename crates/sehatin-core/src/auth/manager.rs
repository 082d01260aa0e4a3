//! Session manager: the single owner of "who is logged in".
//!
//! Consumers hold an `Arc<SessionManager>` and read its state directly; they
//! learn about identity changes through [`SessionEvent`]s rather than by
//! reloading. All state-changing operations run one at a time.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, AuthApi};
use crate::config::Config;
use crate::models::{LoginRequest, UserData};

use super::error::AuthError;
use super::guard::{gate, GateDecision, Route};
use super::session::{PersistedSession, SessionState, SessionStatus};
use super::store::BlobStore;

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the session event channel.
const EVENT_BUFFER_SIZE: usize = 32;

/// Query parameter carrying the one-time key on the login callback URL.
pub const HANDOFF_QUERY_PARAM: &str = "token";

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A transient, user-facing message (a toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: Option<String>,
}

impl Notice {
    fn success(title: &str) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: title.to_string(),
            message: None,
        }
    }

    fn error(title: &str, message: String) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.to_string(),
            message: Some(message),
        }
    }
}

/// Broadcast to every subscriber of a `SessionManager`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session status changed.
    Status(SessionStatus),
    /// The logged-in identity changed. Anything cached for the previous
    /// identity is stale; `redirect` is where the user should land.
    Invalidated {
        user_id: Option<i64>,
        redirect: Route,
    },
    Notice(Notice),
}

/// Where a token handoff gets its credential from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffSource {
    /// One-time key to exchange at the token-exchange endpoint.
    Key(String),
    /// The server-set handoff cookie, read through the same-origin endpoint.
    Cookie,
}

impl HandoffSource {
    /// Pick the handoff source for a login callback URL: the `token` query
    /// parameter if present, otherwise the cookie.
    pub fn from_callback_url(callback: &str) -> Result<Self, AuthError> {
        let url = url::Url::parse(callback)
            .map_err(|e| AuthError::InvalidHandoff(format!("{}: {}", callback, e)))?;

        let key = url
            .query_pairs()
            .find(|(k, _)| k == HANDOFF_QUERY_PARAM)
            .map(|(_, v)| v.into_owned());

        match key {
            Some(key) if !key.is_empty() => Ok(HandoffSource::Key(key)),
            Some(_) => Err(AuthError::InvalidHandoff("empty token parameter".to_string())),
            None => Ok(HandoffSource::Cookie),
        }
    }
}

// ============================================================================
// Session Manager
// ============================================================================

struct Inner {
    state: SessionState,
    last_error: Option<String>,
}

pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    persisted: PersistedSession,
    inner: RwLock<Inner>,
    /// Serializes restore/refresh/login/logout/handoff.
    op_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn BlobStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            api,
            persisted: PersistedSession::new(store),
            inner: RwLock::new(Inner {
                state: SessionState::Unresolved,
                last_error: None,
            }),
            op_lock: Mutex::new(()),
            events,
        }
    }

    /// Build a manager with the API client and blob store the config names.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut api = ApiClient::new(&config.api_base_url(), config.request_timeout())?;
        if let Some(ref url) = config.handoff_url {
            api = api.with_handoff_url(url.clone());
        }
        debug!(base_url = %api.base_url(), "API client configured");
        Ok(Self::new(Arc::new(api), config.blob_store()?))
    }

    // =========================================================================
    // State access
    // =========================================================================

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SessionState {
        self.read().state.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.read().state.status()
    }

    pub fn user(&self) -> Option<UserData> {
        self.read().state.user().cloned()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().state.user().map(|u| u.tokens.access_token.clone())
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.read().state.refreshed_at()
    }

    pub fn is_loading(&self) -> bool {
        self.read().state.is_loading()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().state.is_authenticated()
    }

    /// Message from the most recent failed login, register or handoff.
    pub fn last_error(&self) -> Option<String> {
        self.read().last_error.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Gate a route against the current status.
    pub fn gate(&self, route: &Route) -> GateDecision {
        gate(self.status(), route.access())
    }

    pub fn google_login_url(&self) -> String {
        self.api.google_login_url()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, next: SessionState) {
        let status = next.status();
        let previous = {
            let mut inner = self.write();
            let previous = inner.state.status();
            inner.state = next;
            previous
        };
        if previous != status {
            debug!(from = %previous, to = %status, "Session status changed");
            self.emit(SessionEvent::Status(status));
        }
    }

    fn record_error(&self, title: &str, err: &AuthError) {
        let message = err.user_message();
        self.write().last_error = Some(message.clone());
        self.emit(SessionEvent::Notice(Notice::error(title, message)));
    }

    fn clear_error(&self) {
        self.write().last_error = None;
    }

    fn discard_blob(&self) {
        if let Err(e) = self.persisted.clear() {
            warn!(error = %e, "Failed to remove stored session");
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Resolve the session from the stored blob. Run once at startup, and
    /// again whenever the application is reloaded.
    pub async fn restore(&self) -> SessionStatus {
        let _op = self.op_lock.lock().await;

        match self.persisted.load() {
            Ok(None) => {
                debug!("No stored session");
                self.set_state(SessionState::Unauthenticated);
            }
            Ok(Some(user)) => {
                debug!(username = %user.username(), "Stored session found");
                // Failure is already reflected in the state.
                let _ = self.refresh_locked(user).await;
            }
            Err(AuthError::MalformedBlob(e)) => {
                warn!(error = %e, "Discarding unreadable stored session");
                self.discard_blob();
                self.set_state(SessionState::Unauthenticated);
            }
            Err(e) => {
                // The blob may be fine; leave it for the next run.
                warn!(error = %e, "Could not read stored session");
                self.set_state(SessionState::Unauthenticated);
            }
        }

        self.status()
    }

    /// Trade `user`'s refresh token for new tokens. On success the session
    /// is authenticated and the blob rewritten; on any failure the blob is
    /// removed and the session is logged out.
    pub async fn refresh_credentials(&self, user: UserData) -> Result<UserData, AuthError> {
        let _op = self.op_lock.lock().await;
        self.refresh_locked(user).await
    }

    /// Refresh the current session's tokens.
    pub async fn refresh(&self) -> Result<UserData, AuthError> {
        let _op = self.op_lock.lock().await;
        let user = self.user().ok_or(AuthError::NotAuthenticated)?;
        self.refresh_locked(user).await
    }

    async fn refresh_locked(&self, user: UserData) -> Result<UserData, AuthError> {
        self.set_state(SessionState::Resolving);

        match self.api.refresh(&user.tokens.refresh_token).await {
            Ok(tokens) => {
                let user = user.with_tokens(tokens);
                if let Err(e) = self.persisted.save(&user) {
                    warn!(error = %e, "Failed to save refreshed session");
                }
                info!(username = %user.username(), "Session refreshed");
                self.set_state(SessionState::authenticated(user.clone()));
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed, logging out");
                self.discard_blob();
                self.set_state(SessionState::Unauthenticated);
                Err(e.into())
            }
        }
    }

    /// Log in with a username and password. On failure the session is left
    /// as it was and the error is recorded in `last_error`.
    pub async fn login(&self, request: LoginRequest) -> Result<UserData, AuthError> {
        let _op = self.op_lock.lock().await;

        match self.api.login(&request).await {
            Ok(user) => {
                info!(username = %user.username(), "Login successful");
                self.establish(user.clone());
                self.emit(SessionEvent::Notice(Notice::success("Login successful")));
                Ok(user)
            }
            Err(e) => {
                error!(username = %request.username, error = %e, "Login failed");
                let err = AuthError::from(e);
                self.record_error("Login failed", &err);
                Err(err)
            }
        }
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, request: LoginRequest) -> Result<(), AuthError> {
        match self.api.register(&request).await {
            Ok(()) => {
                info!(username = %request.username, "Registration successful");
                self.clear_error();
                self.emit(SessionEvent::Notice(Notice::success("Registration successful")));
                Ok(())
            }
            Err(e) => {
                error!(username = %request.username, error = %e, "Registration failed");
                let err = AuthError::from(e);
                self.record_error("Registration failed", &err);
                Err(err)
            }
        }
    }

    /// Forget the session. Safe to call repeatedly.
    pub async fn logout(&self) {
        let _op = self.op_lock.lock().await;

        let was_authenticated = self.is_authenticated();
        self.discard_blob();
        self.set_state(SessionState::Unauthenticated);

        if was_authenticated {
            info!("Logged out");
            self.emit(SessionEvent::Invalidated {
                user_id: None,
                redirect: Route::Home,
            });
        }
    }

    /// Complete an external (third-party) login.
    pub async fn complete_handoff(&self, source: HandoffSource) -> Result<UserData, AuthError> {
        let _op = self.op_lock.lock().await;

        let result = match source {
            HandoffSource::Key(ref key) => self.api.exchange_token(key).await.map_err(AuthError::from),
            HandoffSource::Cookie => match self.api.fetch_cookie_handoff().await {
                Ok(raw) => serde_json::from_str::<UserData>(&raw).map_err(AuthError::from),
                Err(e) => Err(e.into()),
            },
        };

        match result {
            Ok(user) => {
                info!(username = %user.username(), "Token handoff complete");
                self.establish(user.clone());
                Ok(user)
            }
            Err(err) => {
                error!(error = %err, "Token handoff failed");
                self.record_error("Login failed", &err);
                Err(err)
            }
        }
    }

    /// Store a freshly obtained session in memory and in the blob, and tell
    /// subscribers the identity changed.
    fn establish(&self, user: UserData) {
        if let Err(e) = self.persisted.save(&user) {
            warn!(error = %e, "Failed to save session");
        }
        let user_id = user.identity.id;
        self.clear_error();
        self.set_state(SessionState::authenticated(user));
        self.emit(SessionEvent::Invalidated {
            user_id: Some(user_id),
            redirect: Route::Home,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use super::*;
    use crate::api::ApiError;
    use crate::auth::session::BLOB_KEY;
    use crate::auth::store::MemoryStore;
    use crate::models::user::fixtures;
    use crate::models::TokenPair;

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Ok,
        Status(u16, &'static str),
        Network,
    }

    impl Reply {
        fn into_error(self) -> Option<ApiError> {
            match self {
                Reply::Ok => None,
                Reply::Status(code, body) => Some(ApiError::from_status(
                    StatusCode::from_u16(code).unwrap(),
                    body,
                )),
                Reply::Network => Some(
                    reqwest::Client::new()
                        .get("not a url")
                        .build()
                        .unwrap_err()
                        .into(),
                ),
            }
        }
    }

    /// Scripted backend. Refresh hands out `access-N`/`refresh-N` pairs.
    struct FakeApi {
        login: Reply,
        register: Reply,
        refresh: Reply,
        exchange: Reply,
        cookie: Result<String, Reply>,
        refresh_tokens_seen: StdMutex<Vec<String>>,
        calls: StdMutex<usize>,
    }

    impl FakeApi {
        fn new() -> Self {
            Self {
                login: Reply::Ok,
                register: Reply::Ok,
                refresh: Reply::Ok,
                exchange: Reply::Ok,
                cookie: Err(Reply::Status(404, "")),
                refresh_tokens_seen: StdMutex::new(Vec::new()),
                calls: StdMutex::new(0),
            }
        }

        fn call(&self) {
            *self.calls.lock().unwrap() += 1;
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn refresh_tokens_seen(&self) -> Vec<String> {
            self.refresh_tokens_seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuthApi for FakeApi {
        async fn login(&self, request: &LoginRequest) -> Result<UserData, ApiError> {
            self.call();
            match self.login.into_error() {
                Some(e) => Err(e),
                None => Ok(fixtures::user(&request.username, "login-access", "login-refresh")),
            }
        }

        async fn register(&self, _request: &LoginRequest) -> Result<(), ApiError> {
            self.call();
            match self.register.into_error() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
            self.call();
            let n = {
                let mut seen = self.refresh_tokens_seen.lock().unwrap();
                seen.push(refresh_token.to_string());
                seen.len()
            };
            // Yield so concurrent callers get a chance to interleave.
            tokio::task::yield_now().await;
            match self.refresh.into_error() {
                Some(e) => Err(e),
                None => Ok(TokenPair {
                    access_token: format!("access-{}", n),
                    refresh_token: format!("refresh-{}", n),
                }),
            }
        }

        async fn exchange_token(&self, key: &str) -> Result<UserData, ApiError> {
            self.call();
            match self.exchange.into_error() {
                Some(e) => Err(e),
                None => Ok(fixtures::user(&format!("google-{}", key), "x-access", "x-refresh")),
            }
        }

        async fn fetch_cookie_handoff(&self) -> Result<String, ApiError> {
            self.call();
            match &self.cookie {
                Ok(raw) => Ok(raw.clone()),
                Err(reply) => Err(reply.into_error().expect("cookie failure reply")),
            }
        }

        fn google_login_url(&self) -> String {
            "http://api.test/api/v1/auth/login-google".to_string()
        }
    }

    fn manager(api: FakeApi) -> (Arc<SessionManager>, Arc<FakeApi>, Arc<MemoryStore>) {
        let api = Arc::new(api);
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(SessionManager::new(api.clone(), store.clone()));
        (manager, api, store)
    }

    fn stored(store: &MemoryStore) -> Option<UserData> {
        store
            .get(BLOB_KEY)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).expect("stored blob should parse"))
    }

    fn seed(store: &MemoryStore, user: &UserData) {
        store.set(BLOB_KEY, &serde_json::to_string(user).unwrap()).unwrap();
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // -------------------------------------------------------------------------
    // Restore
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_starts_unresolved() {
        let (manager, _, _) = manager(FakeApi::new());
        assert_eq!(manager.status(), SessionStatus::Unresolved);
        assert!(manager.is_loading());
        assert!(manager.user().is_none());
    }

    #[tokio::test]
    async fn test_restore_without_blob_makes_no_network_call() {
        let (manager, api, _) = manager(FakeApi::new());
        assert_eq!(manager.restore().await, SessionStatus::Unauthenticated);
        assert_eq!(api.calls(), 0);
        assert!(!manager.is_loading());
    }

    #[tokio::test]
    async fn test_restore_with_blob_and_successful_refresh() {
        let (manager, api, store) = manager(FakeApi::new());
        seed(&store, &fixtures::user("rina", "a0", "r0"));

        assert_eq!(manager.restore().await, SessionStatus::Authenticated);
        assert_eq!(api.refresh_tokens_seen(), vec!["r0".to_string()]);

        let blob = stored(&store).expect("blob should be kept");
        assert_eq!(blob.tokens.access_token, "access-1");
        assert_eq!(blob.tokens.refresh_token, "refresh-1");
        assert_eq!(blob.identity.username, "rina");
        assert_eq!(manager.user(), Some(blob));
        assert_eq!(manager.access_token().as_deref(), Some("access-1"));
        assert!(manager.refreshed_at().is_some());
    }

    #[tokio::test]
    async fn test_restore_with_rejected_refresh() {
        let mut api = FakeApi::new();
        api.refresh = Reply::Status(401, r#"{"detail":"token expired"}"#);
        let (manager, _, store) = manager(api);
        seed(&store, &fixtures::user("rina", "a0", "r0"));

        assert_eq!(manager.restore().await, SessionStatus::Unauthenticated);
        assert!(stored(&store).is_none());
        assert!(manager.user().is_none());
    }

    #[tokio::test]
    async fn test_restore_with_unreachable_refresh() {
        let mut api = FakeApi::new();
        api.refresh = Reply::Network;
        let (manager, _, store) = manager(api);
        seed(&store, &fixtures::user("rina", "a0", "r0"));
        assert!(stored(&store).is_some());

        assert_eq!(manager.restore().await, SessionStatus::Unauthenticated);
        assert!(stored(&store).is_none());
    }

    #[tokio::test]
    async fn test_restore_with_malformed_blob() {
        let (manager, api, store) = manager(FakeApi::new());
        store.set(BLOB_KEY, "{\"id\": 1").unwrap();

        assert_eq!(manager.restore().await, SessionStatus::Unauthenticated);
        assert_eq!(api.calls(), 0);
        assert!(store.get(BLOB_KEY).unwrap().is_none());
    }

    /// Store whose reads fail, counting removals.
    #[derive(Default)]
    struct UnreadableStore {
        removals: StdMutex<usize>,
    }

    impl BlobStore for UnreadableStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow::anyhow!("disk unavailable"))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }

        fn remove(&self, _key: &str) -> Result<()> {
            *self.removals.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_restore_with_unreadable_store_keeps_blob() {
        let api = Arc::new(FakeApi::new());
        let store = Arc::new(UnreadableStore::default());
        let manager = SessionManager::new(api.clone(), store.clone());

        assert_eq!(manager.restore().await, SessionStatus::Unauthenticated);
        assert_eq!(api.calls(), 0);
        assert_eq!(*store.removals.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restore_emits_status_transitions() {
        let (manager, _, store) = manager(FakeApi::new());
        seed(&store, &fixtures::user("rina", "a0", "r0"));
        let mut rx = manager.subscribe();

        manager.restore().await;

        assert_eq!(
            drain(&mut rx),
            vec![
                SessionEvent::Status(SessionStatus::Resolving),
                SessionEvent::Status(SessionStatus::Authenticated),
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_restores_are_serialized() {
        let (manager, api, store) = manager(FakeApi::new());
        seed(&store, &fixtures::user("rina", "a0", "r0"));

        let (first, second) = tokio::join!(manager.restore(), manager.restore());

        assert_eq!(first, SessionStatus::Authenticated);
        assert_eq!(second, SessionStatus::Authenticated);
        // Each restore refreshed once; the second used the tokens the first stored.
        assert_eq!(
            api.refresh_tokens_seen(),
            vec!["r0".to_string(), "refresh-1".to_string()]
        );
        let blob = stored(&store).unwrap();
        assert_eq!(blob.tokens.refresh_token, "refresh-2");
        assert_eq!(manager.access_token().as_deref(), Some("access-2"));
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_refresh_requires_session() {
        let (manager, api, _) = manager(FakeApi::new());
        manager.restore().await;
        assert!(matches!(manager.refresh().await, Err(AuthError::NotAuthenticated)));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_credentials_merges_tokens() {
        let (manager, _, store) = manager(FakeApi::new());
        let user = fixtures::user("rina", "a0", "r0");

        let refreshed = manager.refresh_credentials(user.clone()).await.unwrap();

        assert_eq!(refreshed.identity, user.identity);
        assert_eq!(refreshed.tokens.access_token, "access-1");
        assert_eq!(stored(&store), Some(refreshed));
        assert!(manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_failure_logs_out() {
        let mut api = FakeApi::new();
        api.refresh = Reply::Status(500, "oops");
        let (manager, _, store) = manager(api);
        let user = fixtures::user("rina", "a0", "r0");
        seed(&store, &user);

        let err = manager.refresh_credentials(user).await.unwrap_err();
        assert!(matches!(err, AuthError::Api(ApiError::ServerError(_))));
        assert_eq!(manager.status(), SessionStatus::Unauthenticated);
        assert!(stored(&store).is_none());
    }

    // -------------------------------------------------------------------------
    // Login / register
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_success() {
        let (manager, _, store) = manager(FakeApi::new());
        manager.restore().await;
        let mut rx = manager.subscribe();

        let user = manager.login(LoginRequest::new("rina", "pw")).await.unwrap();

        assert_eq!(user.username(), "rina");
        assert!(manager.is_authenticated());
        assert_eq!(stored(&store), Some(user.clone()));
        assert!(manager.last_error().is_none());

        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::Status(SessionStatus::Authenticated)));
        assert!(events.contains(&SessionEvent::Invalidated {
            user_id: Some(user.identity.id),
            redirect: Route::Home,
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Notice(Notice { level: NoticeLevel::Success, .. })
        )));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mut api = FakeApi::new();
        api.login = Reply::Status(401, r#"{"detail": "invalid credentials"}"#);
        let (manager, _, store) = manager(api);
        manager.restore().await;
        let mut rx = manager.subscribe();

        let err = manager.login(LoginRequest::new("rina", "wrong")).await.unwrap_err();

        assert!(matches!(err, AuthError::Api(ApiError::Unauthorized(_))));
        assert_eq!(manager.status(), SessionStatus::Unauthenticated);
        assert_eq!(manager.last_error().as_deref(), Some("invalid credentials"));
        assert!(store.get(BLOB_KEY).unwrap().is_none());

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![SessionEvent::Notice(Notice {
                level: NoticeLevel::Error,
                title: "Login failed".to_string(),
                message: Some("invalid credentials".to_string()),
            })]
        );
    }

    #[tokio::test]
    async fn test_login_then_reload_keeps_identity() {
        let (manager, _, store) = manager(FakeApi::new());
        manager.restore().await;
        manager.login(LoginRequest::new("rina", "pw")).await.unwrap();

        // A fresh manager over the same store stands in for a page reload.
        let reloaded = SessionManager::new(Arc::new(FakeApi::new()), store.clone());
        assert_eq!(reloaded.restore().await, SessionStatus::Authenticated);
        assert_eq!(reloaded.user().map(|u| u.identity.username), Some("rina".to_string()));

        // Re-running restore on the same manager behaves the same way.
        assert_eq!(manager.restore().await, SessionStatus::Authenticated);
        assert_eq!(manager.user().map(|u| u.identity.username), Some("rina".to_string()));
    }

    #[tokio::test]
    async fn test_failed_login_after_success_keeps_session() {
        let (manager, _, store) = manager(FakeApi::new());
        manager.login(LoginRequest::new("rina", "pw")).await.unwrap();

        let mut failing = FakeApi::new();
        failing.login = Reply::Network;
        let manager2 = SessionManager::new(Arc::new(failing), store.clone());
        manager2.restore().await;
        assert!(manager2.login(LoginRequest::new("budi", "pw")).await.is_err());

        assert!(manager2.is_authenticated());
        assert_eq!(stored(&store).map(|u| u.identity.username), Some("rina".to_string()));
        assert!(manager2.last_error().unwrap().contains("Unable to connect"));
    }

    #[tokio::test]
    async fn test_register_does_not_authenticate() {
        let (manager, _, store) = manager(FakeApi::new());
        manager.restore().await;
        let mut rx = manager.subscribe();

        manager.register(LoginRequest::new("rina", "pw")).await.unwrap();

        assert_eq!(manager.status(), SessionStatus::Unauthenticated);
        assert!(store.get(BLOB_KEY).unwrap().is_none());
        assert_eq!(
            drain(&mut rx),
            vec![SessionEvent::Notice(Notice::success("Registration successful"))]
        );
    }

    #[tokio::test]
    async fn test_register_failure_recorded() {
        let mut api = FakeApi::new();
        api.register = Reply::Status(400, r#"{"detail":"Username already registered"}"#);
        let (manager, _, _) = manager(api);

        assert!(manager.register(LoginRequest::new("rina", "pw")).await.is_err());
        assert_eq!(manager.last_error().as_deref(), Some("Username already registered"));
    }

    // -------------------------------------------------------------------------
    // Logout
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_logout_twice() {
        let (manager, _, store) = manager(FakeApi::new());
        manager.login(LoginRequest::new("rina", "pw")).await.unwrap();
        let mut rx = manager.subscribe();

        manager.logout().await;
        assert_eq!(manager.status(), SessionStatus::Unauthenticated);
        assert!(store.get(BLOB_KEY).unwrap().is_none());

        manager.logout().await;
        assert_eq!(manager.status(), SessionStatus::Unauthenticated);
        assert!(store.get(BLOB_KEY).unwrap().is_none());

        let invalidations = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Invalidated { .. }))
            .count();
        assert_eq!(invalidations, 1);
    }

    // -------------------------------------------------------------------------
    // Handoff
    // -------------------------------------------------------------------------

    #[test]
    fn test_handoff_source_from_callback_url() {
        assert_eq!(
            HandoffSource::from_callback_url("http://localhost:3000/login/handler?token=k1").unwrap(),
            HandoffSource::Key("k1".to_string())
        );
        assert_eq!(
            HandoffSource::from_callback_url("http://localhost:3000/login/handler").unwrap(),
            HandoffSource::Cookie
        );
        assert!(HandoffSource::from_callback_url("http://localhost:3000/login/handler?token=").is_err());
        assert!(HandoffSource::from_callback_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_handoff_with_key() {
        let (manager, _, store) = manager(FakeApi::new());
        manager.restore().await;

        let user = manager
            .complete_handoff(HandoffSource::Key("k1".to_string()))
            .await
            .unwrap();

        assert_eq!(user.username(), "google-k1");
        assert!(manager.is_authenticated());
        assert_eq!(stored(&store), Some(user));
    }

    #[tokio::test]
    async fn test_handoff_with_cookie() {
        let user = fixtures::user("rina", "c-access", "c-refresh");
        let mut api = FakeApi::new();
        api.cookie = Ok(serde_json::to_string(&user).unwrap());
        let (manager, _, store) = manager(api);

        let got = manager.complete_handoff(HandoffSource::Cookie).await.unwrap();

        assert_eq!(got, user);
        assert_eq!(stored(&store), Some(user));
    }

    #[tokio::test]
    async fn test_handoff_with_garbage_cookie() {
        let mut api = FakeApi::new();
        api.cookie = Ok("undefined".to_string());
        let (manager, _, store) = manager(api);
        manager.restore().await;

        let err = manager.complete_handoff(HandoffSource::Cookie).await.unwrap_err();

        assert!(matches!(err, AuthError::MalformedBlob(_)));
        assert_eq!(manager.status(), SessionStatus::Unauthenticated);
        assert!(store.get(BLOB_KEY).unwrap().is_none());
        assert!(manager.last_error().is_some());
    }

    #[tokio::test]
    async fn test_handoff_rejected_key() {
        let mut api = FakeApi::new();
        api.exchange = Reply::Status(401, r#"{"detail":"key already used"}"#);
        let (manager, _, _) = manager(api);
        manager.restore().await;

        assert!(manager
            .complete_handoff(HandoffSource::Key("used".to_string()))
            .await
            .is_err());
        assert_eq!(manager.status(), SessionStatus::Unauthenticated);
        assert_eq!(manager.last_error().as_deref(), Some("key already used"));
    }

    // -------------------------------------------------------------------------
    // Gating
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_gate_follows_session() {
        let (manager, _, _) = manager(FakeApi::new());
        assert_eq!(manager.gate(&Route::Progress), GateDecision::Loading);

        manager.restore().await;
        assert_eq!(manager.gate(&Route::Progress), GateDecision::Redirect(Route::Login));
        assert_eq!(manager.gate(&Route::Login), GateDecision::Render);

        manager.login(LoginRequest::new("rina", "pw")).await.unwrap();
        assert_eq!(manager.gate(&Route::ForumPost(3)), GateDecision::Render);
        assert_eq!(manager.gate(&Route::Register), GateDecision::Redirect(Route::Home));
    }

    #[tokio::test]
    async fn test_google_login_url_from_api() {
        let (manager, _, _) = manager(FakeApi::new());
        assert!(manager.google_login_url().ends_with("/api/v1/auth/login-google"));
    }
}
