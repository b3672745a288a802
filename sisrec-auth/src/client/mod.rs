//! Backend client
//!
//! The authentication endpoints the session store depends on, plus the
//! authenticated client every other request goes through.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sisrec_core::{BackendConfig, ErrorContext, SisrecError, SisrecResult};
use tracing::debug;
use url::Url;

pub mod api;
pub mod http;

pub use api::ApiClient;
pub use http::HttpAuthBackend;

/// Login endpoint, relative to the backend base URL
pub const LOGIN_PATH: &str = "auth/login";
/// Logout endpoint, relative to the backend base URL
pub const LOGOUT_PATH: &str = "auth/logout";

/// Login request body
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Successful login response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    /// Identity payload, kept raw so a malformed one can fall back to token claims
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

/// Error body the backend sends on failure
#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Authentication endpoints
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange credentials for a token and an optional identity payload
    async fn login(&self, credentials: &Credentials) -> AuthResult<LoginResponse>;

    /// Tell the backend the token is no longer in use
    async fn logout(&self, token: &str) -> AuthResult<()>;
}

/// Parse the configured base URL so relative endpoint paths join beneath it
pub fn normalize_base_url(raw: &str) -> SisrecResult<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|e| SisrecError::Config {
        message: format!("Invalid backend URL '{}': {}", raw, e),
        source: Some(Box::new(e)),
        context: ErrorContext::new("http_client").with_operation("parse_base_url"),
    })?;

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Join an endpoint path onto the base URL
///
/// The result must stay on the backend's origin: the bearer token is attached
/// to whatever this returns.
pub fn endpoint(base: &Url, path: &str) -> SisrecResult<Url> {
    let url = base
        .join(path.trim_start_matches('/'))
        .map_err(|e| SisrecError::Config {
            message: format!("Invalid endpoint path '{}': {}", path, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("join_endpoint"),
        })?;

    if url.origin() != base.origin() {
        return Err(SisrecError::Config {
            message: format!(
                "Endpoint path '{}' leaves the backend origin {}",
                path,
                base.origin().ascii_serialization()
            ),
            source: None,
            context: ErrorContext::new("http_client")
                .with_operation("join_endpoint")
                .with_hint("Pass a path relative to backend.base_url"),
        });
    }

    Ok(url)
}

pub(crate) fn create_http_client(config: &BackendConfig) -> SisrecResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent).map_err(|e| {
            SisrecError::Config {
                message: format!("Invalid user agent: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            }
        })?,
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .build()
        .map_err(|e| SisrecError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            status: None,
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })?;

    Ok(client)
}

/// Turn a transport failure into an error with no backend message
pub(crate) fn transport_error(error: reqwest::Error, operation: &str) -> AuthError {
    AuthError::Core(SisrecError::Network {
        message: format!("Request failed: {}", error),
        status: error.status().map(|s| s.as_u16()),
        source: Some(Box::new(error)),
        context: ErrorContext::new("api_client")
            .with_operation(operation)
            .with_hint("Check network connectivity and backend status"),
    })
}

/// Turn a non-success response into `BackendRejected`, keeping the `message` field
pub(crate) async fn handle_response_error(response: reqwest::Response, operation: &str) -> AuthError {
    let status = response.status();
    let url = response.url().clone();

    let error_body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&error_body)
        .ok()
        .and_then(|body| body.message)
        .filter(|m| !m.trim().is_empty());

    debug!(
        operation = operation,
        status = status.as_u16(),
        url = %url,
        "Backend answered with {}",
        message.as_deref().unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error"))
    );

    AuthError::BackendRejected {
        message,
        status: Some(status.as_u16()),
    }
}
