//! Async utilities

use crate::error::{ErrorContext, SisrecError, SisrecResult};
use tokio::time::{timeout, Duration};

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(future: F, timeout_ms: u64, operation_name: &str) -> SisrecResult<T>
where
    F: std::future::Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(SisrecError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_detail("timeout_ms", timeout_ms)
                .with_hint("Increase timeout duration")
                .with_hint("Check network connectivity"),
        }),
    }
}
