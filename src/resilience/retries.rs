//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a request is retryable (GET/HEAD with no body)
//! - Bound the number of extra attempts
//! - Compute the delay before the next attempt
//!
//! # Design Decisions
//! - Never retry POST/PUT/DELETE/PATCH (non-idempotent)
//! - Only connection-level failures are retried, never a received response
//! - Jittered backoff prevents thundering herd

use std::time::Duration;

use axum::http::Method;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Retry policy derived from configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    enabled: bool,
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Total attempts allowed for a request.
    pub fn max_attempts(&self, method: &Method, body_is_empty: bool) -> u32 {
        if self.enabled && is_retryable(method) && body_is_empty {
            self.max_retries + 1
        } else {
            1
        }
    }

    /// Delay before attempt number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

/// Methods whose replay cannot change server state.
pub fn is_retryable(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}
