//! Error types shared by the access core
//!
//! Structured variants carry an [`ErrorContext`] naming the component and
//! operation that failed, so a log line can be traced back to its origin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, warn};

pub type SisrecResult<T> = Result<T, SisrecError>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Where and when an error was raised
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Correlates the log line with whatever the user reports
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub operation: Option<String>,
    /// Key/value details, e.g. the timeout that elapsed
    pub details: BTreeMap<String, String>,
    /// Things the operator can try next
    pub hints: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            details: BTreeMap::new(),
            hints: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hints.push(hint.to_string());
        self
    }
}

/// Infrastructure failures: storage, configuration, transport
#[derive(Error, Debug)]
pub enum SisrecError {
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    /// The backend could not be reached, or answered outside the JSON contract
    #[error("Network error: {message}")]
    Network {
        message: String,
        status: Option<u16>,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    #[error("Invalid {}: {message}", .field.as_deref().unwrap_or("value"))]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("{operation} gave up after {duration_ms} ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SisrecError {
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            SisrecError::Storage { context, .. }
            | SisrecError::Config { context, .. }
            | SisrecError::Network { context, .. }
            | SisrecError::Validation { context, .. }
            | SisrecError::Timeout { context, .. } => Some(context),
            SisrecError::Io(_) | SisrecError::Serialization(_) => None,
        }
    }

    /// Whether the same call may succeed if tried again
    ///
    /// No answer at all, a 5xx, 408 and 429 are transient; any other 4xx is
    /// the backend's final word.
    pub fn is_transient(&self) -> bool {
        match self {
            SisrecError::Network { status: None, .. } => true,
            SisrecError::Network {
                status: Some(status),
                ..
            } => *status >= 500 || matches!(status, 408 | 429),
            SisrecError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Emit the error once, at `warn` when it is transient and `error` otherwise
    pub fn log(&self) {
        let context = self.context();
        let error_id = context.map(|c| c.error_id.as_str());
        let component = context.map(|c| c.component.as_str());
        let operation = context.and_then(|c| c.operation.as_deref());

        if self.is_transient() {
            warn!(
                error_id = error_id,
                component = component,
                operation = operation,
                error = %self,
                "Transient failure"
            );
        } else {
            error!(
                error_id = error_id,
                component = component,
                operation = operation,
                error = %self,
                "Operation failed"
            );
        }
    }
}

/// Storage failure, optionally wrapping the underlying error
#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::SisrecError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::SisrecError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_hint("Check that the session file location is writable"),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::SisrecError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_hint("Run 'sisrec config --init' to write a default config"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::SisrecError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component),
        }
    };
}
