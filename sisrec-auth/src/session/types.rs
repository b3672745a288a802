//! Session types and the session state machine

use crate::auth::{Identity, PermissionSet, Role};
use crate::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};

/// Identity plus the bearer token that proves it; never one without the other
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    pub token: String,
}

impl Session {
    pub fn new(identity: Identity, token: impl Into<String>) -> Self {
        Self {
            identity,
            token: token.into(),
        }
    }
}

/// Where the session currently is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Restore has not run yet
    #[default]
    Uninitialized,
    /// Restore or Login in flight
    Loading,
    Authenticated(Session),
    Unauthenticated,
}

impl SessionState {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Loading => "loading",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Unauthenticated => "unauthenticated",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    BeginRestore,
    BeginLogin,
    /// Restore or Login produced a session
    Established(Session),
    /// Restore or Login ended without a session
    Cleared,
    LoggedOut,
    /// The backend rejected the token on some request
    CredentialRejected,
}

impl SessionEvent {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            SessionEvent::BeginRestore => "begin-restore",
            SessionEvent::BeginLogin => "begin-login",
            SessionEvent::Established(_) => "established",
            SessionEvent::Cleared => "cleared",
            SessionEvent::LoggedOut => "logged-out",
            SessionEvent::CredentialRejected => "credential-rejected",
        }
    }
}

/// Pure transition function of the session state machine
///
/// ```text
/// Uninitialized ─BeginRestore─▶ Loading ─Established─▶ Authenticated
///                                   │                        │
///                                   └──Cleared──▶ Unauthenticated ◀─LoggedOut/CredentialRejected
/// Unauthenticated | Authenticated ─BeginLogin─▶ Loading
/// ```
///
/// `Established` and `Cleared` only complete an in-flight request; arriving in
/// any other state they are rejected, which is how a login answer landing
/// after a logout gets discarded.
pub fn transition(state: &SessionState, event: SessionEvent) -> AuthResult<SessionState> {
    use SessionEvent as E;
    use SessionState as S;

    match (state, event) {
        (S::Loading, E::BeginRestore | E::BeginLogin) => Err(AuthError::RequestInProgress),
        (_, E::BeginRestore | E::BeginLogin) => Ok(S::Loading),

        (S::Loading, E::Established(session)) => Ok(S::Authenticated(session)),
        (S::Loading, E::Cleared) => Ok(S::Unauthenticated),

        (_, E::LoggedOut | E::CredentialRejected) => Ok(S::Unauthenticated),

        (state, event @ (E::Established(_) | E::Cleared)) => Err(AuthError::InvalidTransition {
            state: state.to_string(),
            event: event.name().to_string(),
        }),
    }
}

/// Immutable view handed to guards and pages
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Last login failure message, orthogonal to the state
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn authenticated(session: Session) -> Self {
        Self {
            state: SessionState::Authenticated(session),
            last_error: None,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            last_error: None,
        }
    }

    /// True until Restore or an in-flight Login settles
    pub fn is_loading(&self) -> bool {
        matches!(
            self.state,
            SessionState::Uninitialized | SessionState::Loading
        )
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session().map(|s| &s.identity)
    }

    pub fn token(&self) -> Option<&str> {
        self.session().map(|s| s.token.as_str())
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.identity().is_some_and(|i| i.role == role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.identity().is_some_and(|i| roles.contains(&i.role))
    }

    pub fn permissions(&self) -> PermissionSet {
        PermissionSet::for_identity(self.identity())
    }
}

/// Outcome of a login attempt; failures are values, not errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}
