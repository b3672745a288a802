//! Session Store - the single owner of "who is logged in"
//!
//! Every mutation goes through [`transition`]; the network is only touched
//! between two transitions, never while the state lock is held.

use super::storage::{DurableStorage, PersistedSession, SessionPersistence};
use super::token::{Clock, SystemClock, TokenDecoder};
use super::types::{transition, LoginResult, Session, SessionEvent, SessionSnapshot};
use crate::auth::{Identity, PermissionSet, Role};
use crate::client::{AuthBackend, Credentials};
use crate::{AuthError, AuthResult};
use sisrec_core::performance::measure_async;
use sisrec_core::{log_operation_error, log_operation_start, log_operation_success};
use sisrec_core::{with_timeout, SisrecConfig};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

struct StoreState {
    snapshot: SessionSnapshot,
    /// Bumped by every event that starts or ends a request; completions carry
    /// the value they started with and are dropped when it no longer matches
    epoch: u64,
}

/// Shared session store, meant to live in an `Arc`
pub struct SessionStore {
    state: RwLock<StoreState>,
    changes: watch::Sender<SessionSnapshot>,
    persistence: SessionPersistence,
    backend: Arc<dyn AuthBackend>,
    decoder: TokenDecoder,
    clock: Arc<dyn Clock>,
    logout_timeout_ms: u64,
    login_route: String,
}

impl SessionStore {
    pub fn new(
        storage: Arc<dyn DurableStorage>,
        backend: Arc<dyn AuthBackend>,
        config: &SisrecConfig,
    ) -> Self {
        let (changes, _) = watch::channel(SessionSnapshot::default());

        Self {
            state: RwLock::new(StoreState {
                snapshot: SessionSnapshot::default(),
                epoch: 0,
            }),
            changes,
            persistence: SessionPersistence::new(storage),
            backend,
            decoder: TokenDecoder::new(&config.auth),
            clock: Arc::new(SystemClock),
            logout_timeout_ms: config.backend.logout_timeout_ms,
            login_route: config.routes.login.clone(),
        }
    }

    /// Replace the wall clock used for expiry checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.read().await.snapshot.clone()
    }

    /// Receive every snapshot published after a transition
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.changes.subscribe()
    }

    /// Route the hard redirect goes to when the backend rejects the token
    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.snapshot.token().map(str::to_string)
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.state.read().await.snapshot.identity().cloned()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.snapshot.is_authenticated()
    }

    pub async fn has_role(&self, role: Role) -> bool {
        self.state.read().await.snapshot.has_role(role)
    }

    pub async fn has_any_role(&self, roles: &[Role]) -> bool {
        self.state.read().await.snapshot.has_any_role(roles)
    }

    pub async fn permissions(&self) -> PermissionSet {
        self.state.read().await.snapshot.permissions()
    }

    /// Rebuild the session from durable storage; every failure ends logged out
    pub async fn restore(&self) -> SessionSnapshot {
        let epoch = match self.apply(SessionEvent::BeginRestore, None, |_| Ok(())).await {
            Ok((_, epoch)) => epoch,
            Err(e) => {
                debug!("Restore skipped: {}", e);
                return self.snapshot().await;
            }
        };

        let (event, unusable) = match self.load_persisted() {
            Ok(Some(session)) => {
                info!(
                    "Restored session for {} as {}",
                    session.identity.email, session.identity.role
                );
                (SessionEvent::Established(session), false)
            }
            Ok(None) => {
                debug!("No persisted session");
                (SessionEvent::Cleared, false)
            }
            Err(e) => {
                if e.is_local_recovery() {
                    debug!("Persisted session unusable: {}", e);
                } else {
                    warn!("Failed to restore persisted session: {}", e);
                }
                (SessionEvent::Cleared, true)
            }
        };

        // Leftovers are only removed while this restore is still current
        let committed = self
            .apply(event, Some(epoch), |_| {
                if unusable {
                    self.discard_persisted();
                }
                Ok(())
            })
            .await;

        match committed {
            Ok((snapshot, _)) => snapshot,
            Err(e) => {
                debug!("Restore result discarded: {}", e);
                self.snapshot().await
            }
        }
    }

    /// Authenticate against the backend; failures come back as values
    pub async fn login(&self, email: &str, password: &str) -> LoginResult {
        log_operation_start!("login", email = email);

        let epoch = match self.apply(SessionEvent::BeginLogin, None, |_| Ok(())).await {
            Ok((_, epoch)) => epoch,
            Err(e) => {
                warn!("Login rejected: {}", e);
                return LoginResult::failed(e.user_message());
            }
        };

        let credentials = Credentials::new(email, password);
        let outcome = measure_async("session_login", self.authenticate(&credentials)).await;

        let committed = match outcome {
            Ok(session) => {
                let persistence = &self.persistence;
                let (token, identity) = (session.token.clone(), session.identity.clone());
                self.apply(SessionEvent::Established(session), Some(epoch), |snapshot| {
                    // Both entries land before the state flips
                    persistence.save(&token, &identity)?;
                    snapshot.last_error = None;
                    Ok(())
                })
                .await
                .map(|_| ())
            }
            Err(e) => Err(e),
        };

        match committed {
            Ok(()) => {
                log_operation_success!("login", email = email);
                LoginResult::succeeded()
            }
            Err(e) => self.fail_login(e, epoch).await,
        }
    }

    /// End the session locally; the backend is told on a best-effort basis
    pub async fn logout(&self) {
        if let Some(token) = self.token().await {
            match with_timeout(
                self.notify_logout(&token),
                self.logout_timeout_ms,
                "logout_notification",
            )
            .await
            {
                Ok(Ok(())) => debug!("Backend acknowledged logout"),
                Ok(Err(e)) => warn!("Logout notification failed: {}", e),
                Err(e) => warn!("Logout notification abandoned: {}", e),
            }
        }

        self.discard_persisted();
        if let Err(e) = self.apply(SessionEvent::LoggedOut, None, |_| Ok(())).await {
            warn!("Logout transition failed: {}", e);
        }
        info!("Session ended");
    }

    /// Reset the error flag without touching the session
    pub async fn clear_error(&self) {
        let mut state = self.state.write().await;
        if state.snapshot.last_error.take().is_some() {
            self.changes.send_replace(state.snapshot.clone());
        }
    }

    /// React to the backend rejecting the current token
    pub async fn invalidate(&self) {
        self.reject_credentials(None).await;
    }

    /// Like [`invalidate`](Self::invalidate), but only while `token` is still
    /// the session's token; a rejection of a replaced token is ignored
    pub async fn invalidate_token(&self, token: &str) {
        self.reject_credentials(Some(token)).await;
    }

    fn load_persisted(&self) -> AuthResult<Option<Session>> {
        match self.persistence.load()? {
            PersistedSession::Empty => Ok(None),
            PersistedSession::Partial => Err(AuthError::decode("incomplete persisted session")),
            PersistedSession::Complete { token, user_json } => {
                let claims = self.decoder.decode_fresh(&token, self.clock.now())?;
                let identity: Identity = serde_json::from_str(&user_json).map_err(|e| {
                    AuthError::decode(format!("identity snapshot unreadable: {}", e))
                })?;
                let identity = self.decoder.reconcile(identity, &claims);
                Ok(Some(Session::new(identity, token)))
            }
        }
    }

    /// One retry on a transient failure, inside the caller's time budget
    async fn notify_logout(&self, token: &str) -> AuthResult<()> {
        match self.backend.logout(token).await {
            Err(e) if e.is_transient() => {
                debug!("Retrying logout notification after: {}", e);
                self.backend.logout(token).await
            }
            outcome => outcome,
        }
    }

    async fn authenticate(&self, credentials: &Credentials) -> AuthResult<Session> {
        let response = self.backend.login(credentials).await?;

        let token = response.token.trim().to_string();
        if token.is_empty() {
            return Err(AuthError::MissingIdentity);
        }

        let claims = match self.decoder.decode(&token) {
            Ok(claims) if claims.is_expired_at(self.clock.now()) => {
                return Err(AuthError::Expired {
                    expires_at: claims.expires_at,
                });
            }
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!("Login token payload unreadable: {}", e);
                None
            }
        };

        let explicit = response
            .user
            .and_then(|raw| match serde_json::from_value::<Identity>(raw) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    warn!("Ignoring malformed identity payload: {}", e);
                    None
                }
            });

        let identity = match (explicit, claims) {
            (Some(identity), Some(claims)) => self.decoder.reconcile(identity, &claims),
            (Some(identity), None) => {
                warn!(
                    "Token for {} carries no readable claims, keeping backend identity",
                    identity.email
                );
                identity
            }
            (None, Some(claims)) => self.decoder.identity_from_claims(&claims)?,
            (None, None) => return Err(AuthError::MissingIdentity),
        };

        Ok(Session::new(identity, token))
    }

    async fn fail_login(&self, error: AuthError, epoch: u64) -> LoginResult {
        let message = error.user_message();
        match &error {
            AuthError::Core(core) => core.log(),
            _ => {
                log_operation_error!("login", error);
            }
        }

        // A failed attempt must not leave an older session behind for the next boot,
        // but only while it is still the current attempt
        let recorded = self
            .apply(SessionEvent::Cleared, Some(epoch), |snapshot| {
                self.discard_persisted();
                snapshot.last_error = Some(message.clone());
                Ok(())
            })
            .await;
        if let Err(e) = recorded {
            debug!("Login failure not recorded: {}", e);
        }

        LoginResult::failed(message)
    }

    async fn reject_credentials(&self, rejected: Option<&str>) {
        let outcome = self
            .apply(SessionEvent::CredentialRejected, None, |snapshot| {
                if let Some(rejected) = rejected {
                    if snapshot.token() != Some(rejected) {
                        return Err(AuthError::InvalidTransition {
                            state: snapshot.state.to_string(),
                            event: "credential-rejected for a replaced token".to_string(),
                        });
                    }
                }
                self.discard_persisted();
                Ok(())
            })
            .await;

        match outcome {
            Ok(_) => warn!("Session invalidated by backend rejection"),
            Err(e) => debug!("Rejection ignored: {}", e),
        }
    }

    fn discard_persisted(&self) {
        if let Err(e) = self.persistence.clear() {
            e.log();
        }
    }

    /// Run one event through the state machine and publish the result
    ///
    /// `expected_epoch` marks a completion event; it is rejected when another
    /// request started or ended since. `update` runs before the new state is
    /// stored and aborts the transition by returning an error.
    async fn apply<F>(
        &self,
        event: SessionEvent,
        expected_epoch: Option<u64>,
        update: F,
    ) -> AuthResult<(SessionSnapshot, u64)>
    where
        F: FnOnce(&mut SessionSnapshot) -> AuthResult<()>,
    {
        let mut state = self.state.write().await;

        if let Some(expected) = expected_epoch {
            if expected != state.epoch {
                return Err(AuthError::InvalidTransition {
                    state: state.snapshot.state.to_string(),
                    event: format!("stale {}", event.name()),
                });
            }
        }

        let completes = expected_epoch.is_some();
        let next = transition(&state.snapshot.state, event)?;

        let mut snapshot = state.snapshot.clone();
        update(&mut snapshot)?;
        snapshot.state = next;

        if !completes {
            state.epoch += 1;
        }
        state.snapshot = snapshot.clone();
        self.changes.send_replace(snapshot.clone());

        debug!(state = %snapshot.state, epoch = state.epoch, "Session transition");
        Ok((snapshot, state.epoch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountStatus;
    use crate::client::LoginResponse;
    use crate::session::storage::{MemoryStorage, AUTH_TOKEN_KEY, USER_KEY};
    use crate::session::token::tests::token_with;
    use crate::session::SessionState;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000;

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(self.0, 0).unwrap()
        }
    }

    /// Scripted backend: answers logins from the queue, in call order
    #[derive(Default)]
    struct ScriptedBackend {
        login_answers: Mutex<VecDeque<AuthResult<LoginResponse>>>,
        /// Applied to the first login call only
        first_login_delay: Option<Duration>,
        login_calls: AtomicUsize,
        logout_delay: Option<Duration>,
        /// Logout calls that fail with an unreachable backend before one succeeds
        failing_logouts: AtomicUsize,
        logout_attempts: AtomicUsize,
        logouts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn answering(answer: AuthResult<LoginResponse>) -> Self {
            Self::queued([answer], None)
        }

        fn queued(
            answers: impl IntoIterator<Item = AuthResult<LoginResponse>>,
            first_login_delay: Option<Duration>,
        ) -> Self {
            Self {
                login_answers: Mutex::new(answers.into_iter().collect()),
                first_login_delay,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl AuthBackend for ScriptedBackend {
        async fn login(&self, _credentials: &Credentials) -> AuthResult<LoginResponse> {
            let answer = self
                .login_answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(AuthError::MissingIdentity));
            if self.login_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(delay) = self.first_login_delay {
                    tokio::time::sleep(delay).await;
                }
            }
            answer
        }

        async fn logout(&self, token: &str) -> AuthResult<()> {
            if let Some(delay) = self.logout_delay {
                tokio::time::sleep(delay).await;
            }
            self.logout_attempts.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failing_logouts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(AuthError::Core(sisrec_core::SisrecError::Network {
                    message: "Connection refused".to_string(),
                    status: None,
                    source: None,
                    context: sisrec_core::ErrorContext::new("scripted_backend"),
                }));
            }
            self.logouts.lock().unwrap().push(token.to_string());
            Ok(())
        }
    }

    fn store_with(storage: Arc<MemoryStorage>, backend: Arc<ScriptedBackend>) -> SessionStore {
        SessionStore::new(storage, backend, &SisrecConfig::default())
            .with_clock(Arc::new(FixedClock(NOW)))
    }

    fn admin_token(exp: i64) -> String {
        token_with(json!({
            "sub": "a@x.com",
            "nome": "Ana",
            "papel": ["ROLE_ADMIN"],
            "exp": exp
        }))
    }

    fn token_only(token: String) -> AuthResult<LoginResponse> {
        Ok(LoginResponse { token, user: None })
    }

    #[tokio::test]
    async fn test_initial_snapshot_is_loading() {
        let store = store_with(Arc::default(), Arc::default());
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Uninitialized);
        assert!(snapshot.is_loading());
    }

    #[tokio::test]
    async fn test_restore_without_storage_is_logged_out() {
        let store = store_with(Arc::default(), Arc::default());
        let snapshot = store.restore().await;
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
        assert!(snapshot.last_error.is_none());
    }

    #[tokio::test]
    async fn test_restore_expired_token_clears_storage() {
        let identity = Identity::new("Ana", "a@x.com", Role::Administrator);
        let storage = Arc::new(MemoryStorage::with_entries([
            (AUTH_TOKEN_KEY, admin_token(NOW)),
            (USER_KEY, serde_json::to_string(&identity).unwrap()),
        ]));
        let store = store_with(storage.clone(), Arc::default());

        let snapshot = store.restore().await;
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_restore_corrupted_token_is_idempotent() {
        let storage = Arc::new(MemoryStorage::with_entries([
            (AUTH_TOKEN_KEY, "definitely.not.a-token"),
            (USER_KEY, "{}"),
        ]));
        let store = store_with(storage.clone(), Arc::default());

        let first = store.restore().await;
        let second = store.restore().await;
        assert_eq!(first, second);
        assert_eq!(first.state, SessionState::Unauthenticated);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_restore_orphaned_entry_is_discarded() {
        let storage = Arc::new(MemoryStorage::with_entries([(AUTH_TOKEN_KEY, admin_token(NOW + 60))]));
        let store = store_with(storage.clone(), Arc::default());

        assert!(!store.restore().await.is_authenticated());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_restore_reconciles_role_from_token() {
        let stale = Identity::new("Ana", "a@x.com", Role::Visitor);
        let storage = Arc::new(MemoryStorage::with_entries([
            (AUTH_TOKEN_KEY, admin_token(NOW + 60)),
            (USER_KEY, serde_json::to_string(&stale).unwrap()),
        ]));
        let store = store_with(storage, Arc::default());

        store.restore().await;
        assert!(store.has_role(Role::Administrator).await);
        assert!(!store.has_role(Role::Visitor).await);
    }

    #[tokio::test]
    async fn test_token_only_login_derives_identity() {
        let backend = Arc::new(ScriptedBackend::answering(token_only(admin_token(NOW + 3600))));
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone(), backend);
        store.restore().await;

        let result = store.login("a@x.com", "secret1").await;
        assert_eq!(result, LoginResult::succeeded());

        let identity = store.identity().await.unwrap();
        assert_eq!(identity.role, Role::Administrator);
        assert_eq!(identity.name, "Ana");
        assert_eq!(identity.status, AccountStatus::Active);
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn test_login_then_restore_round_trip() {
        let explicit = Identity::new("Rui", "r@x.com", Role::Receptionist)
            .with_avatar("https://cdn.example/rui.png");
        let token = token_with(json!({
            "sub": "r@x.com",
            "papel": ["ROLE_RECEPCIONISTA"],
            "exp": NOW + 3600
        }));
        let backend = Arc::new(ScriptedBackend::answering(Ok(LoginResponse {
            token,
            user: Some(serde_json::to_value(&explicit).unwrap()),
        })));
        let storage = Arc::new(MemoryStorage::new());

        let store = store_with(storage.clone(), backend);
        store.restore().await;
        assert!(store.login("r@x.com", "secret1").await.success);
        let before = store.identity().await;

        // Simulated reload over the same storage
        let reloaded = store_with(storage, Arc::default());
        let snapshot = reloaded.restore().await;
        assert_eq!(snapshot.identity().cloned(), before);
        assert_eq!(snapshot.identity(), Some(&explicit));
    }

    #[tokio::test]
    async fn test_backend_message_becomes_login_error() {
        let backend = Arc::new(ScriptedBackend::answering(Err(AuthError::BackendRejected {
            message: Some("Credenciais inválidas".to_string()),
            status: Some(401),
        })));
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone(), backend);
        store.restore().await;

        let result = store.login("a@x.com", "wrong").await;
        assert_eq!(result, LoginResult::failed("Credenciais inválidas"));

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
        assert_eq!(snapshot.last_error.as_deref(), Some("Credenciais inválidas"));
        assert!(storage.is_empty());

        store.clear_error().await;
        let snapshot = store.snapshot().await;
        assert!(snapshot.last_error.is_none());
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_login_without_identity_fails() {
        let token = token_with(json!({"exp": NOW + 60, "papel": ["ROLE_ADMIN"]}));
        let backend = Arc::new(ScriptedBackend::answering(token_only(token)));
        let store = store_with(Arc::default(), backend);
        store.restore().await;

        let result = store.login("a@x.com", "secret1").await;
        assert_eq!(result.error.as_deref(), Some(crate::messages::MISSING_IDENTITY));
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_login_with_expired_token_fails() {
        let backend = Arc::new(ScriptedBackend::answering(token_only(admin_token(NOW - 1))));
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone(), backend);
        store.restore().await;

        assert!(!store.login("a@x.com", "secret1").await.success);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_second_login_while_loading_is_rejected() {
        let backend = Arc::new(ScriptedBackend::queued(
            [token_only(admin_token(NOW + 60))],
            Some(Duration::from_millis(100)),
        ));
        let store = Arc::new(store_with(Arc::default(), backend));
        store.restore().await;

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.login("a@x.com", "secret1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = store.login("a@x.com", "secret1").await;
        assert_eq!(second.error.as_deref(), Some(crate::messages::REQUEST_IN_PROGRESS));

        assert!(first.await.unwrap().success);
        assert!(store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_logout_during_login_discards_result() {
        let backend = Arc::new(ScriptedBackend::queued(
            [token_only(admin_token(NOW + 60))],
            Some(Duration::from_millis(100)),
        ));
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(store_with(storage.clone(), backend));
        store.restore().await;

        let pending = {
            let store = store.clone();
            tokio::spawn(async move { store.login("a@x.com", "secret1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.logout().await;

        assert!(!pending.await.unwrap().success);
        assert_eq!(store.snapshot().await.state, SessionState::Unauthenticated);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_stale_login_keeps_newer_session() {
        let receptionist = token_with(json!({
            "sub": "r@x.com",
            "papel": ["ROLE_RECEPCIONISTA"],
            "exp": NOW + 3600
        }));
        let backend = Arc::new(ScriptedBackend::queued(
            [token_only(admin_token(NOW + 60)), token_only(receptionist.clone())],
            Some(Duration::from_millis(150)),
        ));
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(store_with(storage.clone(), backend));
        store.restore().await;

        let slow = {
            let store = store.clone();
            tokio::spawn(async move { store.login("a@x.com", "secret1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.logout().await;

        assert!(store.login("r@x.com", "secret2").await.success);
        assert_eq!(storage.len(), 2);

        // The first attempt lands last and must not touch the newer session
        assert!(!slow.await.unwrap().success);
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.get(AUTH_TOKEN_KEY).unwrap(), Some(receptionist.clone()));

        let snapshot = store.snapshot().await;
        assert!(snapshot.is_authenticated());
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.has_role(Role::Receptionist));

        let reloaded = store_with(storage, Arc::default()).restore().await;
        assert_eq!(reloaded.token(), Some(receptionist.as_str()));
    }

    #[tokio::test]
    async fn test_rejection_of_replaced_token_is_ignored() {
        let old_token = admin_token(NOW + 60);
        let new_token = admin_token(NOW + 120);
        let backend = Arc::new(ScriptedBackend::queued(
            [token_only(old_token.clone()), token_only(new_token.clone())],
            None,
        ));
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone(), backend);
        store.restore().await;
        assert!(store.login("a@x.com", "secret1").await.success);
        assert!(store.login("a@x.com", "secret1").await.success);

        store.invalidate_token(&old_token).await;
        assert_eq!(store.token().await, Some(new_token.clone()));
        assert_eq!(storage.len(), 2);

        store.invalidate_token(&new_token).await;
        assert!(!store.is_authenticated().await);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_logout_notifies_backend_and_clears() {
        let backend = Arc::new(ScriptedBackend::answering(token_only(admin_token(NOW + 60))));
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone(), backend.clone());
        store.restore().await;
        store.login("a@x.com", "secret1").await;

        store.logout().await;
        assert_eq!(backend.logouts.lock().unwrap().len(), 1);
        assert!(!store.is_authenticated().await);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_logout_notification_retried_once() {
        let backend = Arc::new(ScriptedBackend {
            failing_logouts: AtomicUsize::new(1),
            ..ScriptedBackend::answering(token_only(admin_token(NOW + 60)))
        });
        let store = store_with(Arc::default(), backend.clone());
        store.restore().await;
        store.login("a@x.com", "secret1").await;

        store.logout().await;
        assert_eq!(backend.logout_attempts.load(Ordering::SeqCst), 2);
        assert_eq!(backend.logouts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_logout_gives_up_after_retry() {
        let backend = Arc::new(ScriptedBackend {
            failing_logouts: AtomicUsize::new(5),
            ..ScriptedBackend::answering(token_only(admin_token(NOW + 60)))
        });
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone(), backend.clone());
        store.restore().await;
        store.login("a@x.com", "secret1").await;

        store.logout().await;
        assert_eq!(backend.logout_attempts.load(Ordering::SeqCst), 2);
        assert!(backend.logouts.lock().unwrap().is_empty());
        assert!(!store.is_authenticated().await);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_slow_logout_notification_does_not_block() {
        let backend = Arc::new(ScriptedBackend {
            logout_delay: Some(Duration::from_secs(30)),
            ..ScriptedBackend::answering(token_only(admin_token(NOW + 60)))
        });
        let mut config = SisrecConfig::default();
        config.backend.logout_timeout_ms = 50;
        let store = SessionStore::new(Arc::new(MemoryStorage::new()), backend, &config)
            .with_clock(Arc::new(FixedClock(NOW)));
        store.restore().await;
        store.login("a@x.com", "secret1").await;

        tokio::time::timeout(Duration::from_secs(5), store.logout())
            .await
            .expect("logout should not wait for the backend");
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_invalidate_publishes_logged_out() {
        let backend = Arc::new(ScriptedBackend::answering(token_only(admin_token(NOW + 60))));
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone(), backend);
        store.restore().await;
        store.login("a@x.com", "secret1").await;

        let mut changes = store.subscribe();
        store.invalidate().await;

        changes.changed().await.unwrap();
        assert_eq!(changes.borrow().state, SessionState::Unauthenticated);
        assert!(storage.is_empty());
        assert!(store.permissions().await.granted().is_empty());
    }
}
