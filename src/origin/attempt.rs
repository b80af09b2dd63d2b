//! Per-attempt bookkeeping for proxied requests.

use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;

use crate::errors::{GatewayError, StatusCategory};

/// One try at sending a request to an origin server.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAttempt {
    /// 1-based, increasing within a request.
    pub attempt: u32,
    pub origin: String,
    pub server: String,
    pub read_timeout_ms: u64,
    pub status: Option<u16>,
    pub category: Option<StatusCategory>,
    /// Error kind, if the attempt failed.
    pub error: Option<&'static str>,
    pub duration_ms: u64,
}

impl RequestAttempt {
    pub fn new(attempt: u32, origin: &str, server: &str, read_timeout_ms: u64) -> Self {
        Self {
            attempt,
            origin: origin.to_string(),
            server: server.to_string(),
            read_timeout_ms,
            status: None,
            category: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn complete(&mut self, status: StatusCode, elapsed: Duration) {
        self.status = Some(status.as_u16());
        self.category = Some(StatusCategory::from_origin_status(status));
        self.duration_ms = elapsed.as_millis() as u64;
    }

    pub fn fail(&mut self, err: &GatewayError, elapsed: Duration) {
        self.category = Some(err.status_category());
        self.error = Some(err.kind());
        self.duration_ms = elapsed.as_millis() as u64;
    }

    pub fn is_success(&self) -> bool {
        self.category.map(|c| c.is_success()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_outcomes() {
        let mut ok = RequestAttempt::new(1, "api", "127.0.0.1:1", 100);
        ok.complete(StatusCode::OK, Duration::from_millis(5));
        assert!(ok.is_success());
        assert_eq!(ok.status, Some(200));

        let mut failed = RequestAttempt::new(2, "api", "127.0.0.1:1", 100);
        failed.fail(
            &GatewayError::OriginReadTimeout {
                server: "127.0.0.1:1".into(),
                timeout_ms: 100,
            },
            Duration::from_millis(100),
        );
        assert!(!failed.is_success());
        assert_eq!(failed.error, Some("ORIGIN_READ_TIMEOUT"));
        assert_eq!(failed.category, Some(StatusCategory::FailureOriginReadTimeout));
    }
}
