//! Retry decisions for origin attempts.
//!
//! # Responsibilities
//! - Decide whether a failed attempt may be replayed on another server
//! - Compute the delay before the next attempt
//!
//! # Design Decisions
//! - Connect failures, connect/read timeouts, resets and exhausted server
//!   connection slots are always retryable
//! - An origin 503 is retryable only when the origin sets `retry_on_503`
//! - Protocol errors and gateway-local failures are never retried

use std::time::Duration;

use axum::http::StatusCode;

use crate::config::OriginConfig;
use crate::errors::GatewayError;
use crate::resilience::backoff::calculate_backoff;

/// Retry budget of a single proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_on_503: bool,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl RetryPolicy {
    /// Policy from the origin's settings with a per-request retry ceiling.
    pub fn for_origin(settings: &OriginConfig, max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_on_503: settings.retry_on_503,
            backoff_base_ms: settings.retry_backoff_base_ms,
            backoff_max_ms: settings.retry_backoff_max_ms,
        }
    }

    /// Total attempts allowed, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// After `attempt` (1-based) failed with `err`, may another attempt run?
    pub fn should_retry_error(&self, attempt: u32, err: &GatewayError) -> bool {
        attempt < self.max_attempts() && err.is_retryable()
    }

    /// After `attempt` (1-based) got `status` from the origin, may another
    /// attempt run?
    pub fn should_retry_status(&self, attempt: u32, status: StatusCode) -> bool {
        self.retry_on_503 && status == StatusCode::SERVICE_UNAVAILABLE && attempt < self.max_attempts()
    }

    /// Delay before attempt `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.backoff_base_ms, self.backoff_max_ms)
    }
}
