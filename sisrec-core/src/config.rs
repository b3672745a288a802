//! Configuration management

use crate::error::{ErrorContext, SisrecError, SisrecResult};
use crate::types::{AuthConfig, BackendConfig, RoutesConfig, SisrecConfig, StorageConfig};
use crate::LoggingConfig;

use std::path::{Path, PathBuf};

/// Environment variable overriding `backend.base_url`
pub const BACKEND_URL_ENV: &str = "SISREC_BACKEND_URL";

impl Default for SisrecConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            routes: RoutesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_seconds: 30,
            logout_timeout_ms: 3000,
            user_agent: "sisrec/0.1".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            session_file: "~/.sisrec/session.json".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            role_claim: "papel".to_string(),
            role_prefix: "ROLE_".to_string(),
        }
    }
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            dashboard: "/dashboard".to_string(),
            visitor_landing: "/visitas".to_string(),
            unauthorized: "/nao-autorizado".to_string(),
            account_suspended: "/conta-suspensa".to_string(),
        }
    }
}

impl StorageConfig {
    /// Session file path with a leading `~` expanded
    pub fn resolved_session_file(&self) -> PathBuf {
        expand_home(&self.session_file)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

impl SisrecConfig {
    /// Default config file location (`~/.sisrec/config.toml`)
    pub fn default_path() -> PathBuf {
        expand_home("~/.sisrec/config.toml")
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SisrecResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SisrecError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_hint("Check if the config file exists and is readable"),
        })?;

        let config: SisrecConfig = toml::from_str(&content).map_err(|e| SisrecError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_hint("Check TOML syntax in config file"),
        })?;

        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> SisrecResult<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.base_url = url;
            }
        }
        self
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> SisrecResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| SisrecError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| SisrecError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_hint("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SisrecResult<()> {
        let base = url::Url::parse(&self.backend.base_url).map_err(|e| SisrecError::Config {
            message: format!("Invalid backend.base_url '{}': {}", self.backend.base_url, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("validate")
                .with_hint("Use an absolute http(s) URL, e.g. http://localhost:8080/api"),
        })?;

        if !matches!(base.scheme(), "http" | "https") {
            return Err(crate::config_error!(
                format!("Unsupported backend scheme: {}", base.scheme()),
                "config"
            ));
        }

        if self.backend.timeout_seconds == 0 {
            return Err(SisrecError::Config {
                message: "backend.timeout_seconds must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_hint("Set backend.timeout_seconds to a positive value"),
            });
        }

        if self.auth.role_claim.trim().is_empty() {
            return Err(crate::validation_error!(
                "auth.role_claim must not be empty",
                "auth.role_claim",
                "config"
            ));
        }

        for (field, route) in [
            ("routes.login", &self.routes.login),
            ("routes.dashboard", &self.routes.dashboard),
            ("routes.visitor_landing", &self.routes.visitor_landing),
            ("routes.unauthorized", &self.routes.unauthorized),
            ("routes.account_suspended", &self.routes.account_suspended),
        ] {
            if !route.starts_with('/') {
                return Err(crate::validation_error!(
                    format!("Route '{}' must start with '/'", route),
                    field,
                    "config"
                ));
            }
        }

        Ok(())
    }
}
