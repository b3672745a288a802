//! SISREC Core - shared error, logging and configuration layer
//!
//! Everything the access core and the CLI agree on lives here; the
//! authorization logic itself is in `sisrec-auth`.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
