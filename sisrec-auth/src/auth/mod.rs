//! Authorization Module
//!
//! Identity types and the static role → capability table consulted by pages
//! to decide which actions to render.

pub mod identity;
pub mod permissions;

pub use identity::{AccountStatus, Identity, Role};
pub use permissions::{Capability, PermissionSet, CAPABILITY_TABLE};
