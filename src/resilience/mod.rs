//! Resilience helpers for the proxy endpoint.
//!
//! # Data Flow
//! ```text
//! Attempt against an origin server:
//!     → connect/read bounded by the origin's timeouts
//!     → On failure: retries.rs (retryable? attempts left?)
//!     → backoff.rs (jittered delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Only failures that never reached the origin's application are retried,
//!   plus 503 when the origin opts in
//! - Every retry goes to a freshly selected server

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::RetryPolicy;
