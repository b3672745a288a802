//! Core configuration type definitions

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the access core and the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SisrecConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub routes: RoutesConfig,
    pub logging: LoggingConfig,
}

/// REST backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL every endpoint path is joined onto
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Upper bound for the best-effort logout notification
    pub logout_timeout_ms: u64,
    /// User agent string
    pub user_agent: String,
}

/// Durable storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Session document path, `~` is expanded to the home directory
    pub session_file: String,
}

/// Token claim layout used by decode-at-boot and decode-at-login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Claim key holding the ordered role list
    pub role_claim: String,
    /// Marker the backend puts in front of every role name
    pub role_prefix: String,
}

/// Route paths the access guard redirects to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    pub login: String,
    pub dashboard: String,
    pub visitor_landing: String,
    pub unauthorized: String,
    pub account_suspended: String,
}
