//! SISREC Auth - session store, access guards and permission predicates
//!
//! This crate is the authorization core of the SISREC reception front end:
//!
//! - **Session Store** (`session`): who is logged in, restored from durable
//!   storage at boot, updated by login/logout and by backend rejections
//! - **Access Guard** (`guard`): route-level decisions read from the store's
//!   in-memory snapshot, no network involved
//! - **Permission Predicate Set** (`auth`): static role → capability table
//! - **Backend client** (`client`): the REST endpoints the store depends on
//!
//! ## Composition
//!
//! Nothing here is a global. A composition root builds one `SessionStore`
//! and hands `Arc`s of it to the router and to page components:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use sisrec_auth::{client::HttpAuthBackend, session::{MemoryStorage, SessionStore}};
//! # async fn boot(config: sisrec_core::SisrecConfig) -> sisrec_auth::AuthResult<()> {
//! let backend = Arc::new(HttpAuthBackend::new(&config.backend)?);
//! let store = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new()), backend, &config));
//! store.restore().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod guard;
pub mod session;

pub use auth::{AccountStatus, Capability, Identity, PermissionSet, Role};
pub use guard::{AccessGuard, GuardOutcome, PendingDestination, Redirect, RedirectState, RouteRequirements};
pub use session::{
    LoginResult, Session, SessionEvent, SessionSnapshot, SessionState, SessionStore,
};

use sisrec_core::SisrecError;

/// User-facing messages surfaced by the store and the guards
pub mod messages {
    pub const GENERIC_LOGIN_ERROR: &str = "Erro inesperado. Tente novamente.";
    pub const MISSING_IDENTITY: &str = "Não foi possível identificar o usuário autenticado.";
    pub const EXPIRED_AT_LOGIN: &str = "Sessão expirada. Faça login novamente.";
    pub const REQUEST_IN_PROGRESS: &str = "Já existe uma autenticação em andamento.";
    pub const LOGIN_REQUIRED: &str = "Faça login para acessar esta página.";
}

/// Authorization-core error taxonomy
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token could not be decoded: {reason}")]
    DecodeFailure { reason: String },

    #[error("Token expired at {expires_at}")]
    Expired { expires_at: i64 },

    #[error("Login succeeded but no usable identity could be established")]
    MissingIdentity,

    #[error(
        "Backend rejected the request: {}",
        .message.as_deref().unwrap_or("no message")
    )]
    BackendRejected {
        /// Backend-provided message, if the error body carried one
        message: Option<String>,
        status: Option<u16>,
    },

    #[error("Another authentication request is already in progress")]
    RequestInProgress,

    #[error("Invalid session transition: {event} while {state}")]
    InvalidTransition { state: String, event: String },

    #[error("Session is no longer valid, redirect to {redirect_to}")]
    SessionExpired { redirect_to: String },

    #[error(transparent)]
    Core(#[from] SisrecError),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn decode<S: Into<String>>(reason: S) -> Self {
        Self::DecodeFailure {
            reason: reason.into(),
        }
    }

    /// Message suitable for inline feedback on the login form
    pub fn user_message(&self) -> String {
        match self {
            AuthError::MissingIdentity => messages::MISSING_IDENTITY.to_string(),
            AuthError::Expired { .. } => messages::EXPIRED_AT_LOGIN.to_string(),
            AuthError::RequestInProgress => messages::REQUEST_IN_PROGRESS.to_string(),
            AuthError::BackendRejected {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            _ => messages::GENERIC_LOGIN_ERROR.to_string(),
        }
    }

    /// Worth one more attempt: no answer, a timeout or a server-side failure
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Core(error) => error.is_transient(),
            AuthError::BackendRejected {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }

    /// True for failures Restore silently degrades to logged-out
    pub fn is_local_recovery(&self) -> bool {
        matches!(
            self,
            AuthError::DecodeFailure { .. } | AuthError::Expired { .. }
        )
    }
}
