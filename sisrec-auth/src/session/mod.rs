//! Session Module
//!
//! The session store, its state machine, token claim extraction and the
//! durable storage the session survives restarts in.

pub mod storage;
pub mod store;
pub mod token;
pub mod types;

pub use storage::{
    DurableStorage, FileStorage, MemoryStorage, PersistedSession, SessionPersistence,
    AUTH_TOKEN_KEY, USER_KEY,
};
pub use store::SessionStore;
pub use token::{Clock, SystemClock, TokenClaims, TokenDecoder};
pub use types::{transition, LoginResult, Session, SessionEvent, SessionSnapshot, SessionState};
