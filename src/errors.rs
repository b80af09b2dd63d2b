//! Gateway error taxonomy and request status categories.
//!
//! Every failure the gateway can observe maps onto a [`GatewayError`]. Each
//! error knows which [`StatusCategory`] it belongs to, which HTTP status the
//! client should see, and whether a proxy attempt that hit it may be retried
//! against another server.

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Classification of a completed request, attached to the session context
/// for observability filters and access logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCategory {
    Success,
    FailureLocal,
    FailureLocalNoRoute,
    FailureLocalIdleTimeout,
    FailureLocalThrottledOriginConcurrency,
    FailureLocalThrottledOriginServerConnection,
    FailureClientCancelled,
    FailureClientBadRequest,
    FailureClientTimeout,
    FailureOrigin,
    FailureOriginReadTimeout,
    FailureOriginConnectivity,
    FailureOriginResetConnection,
    FailureOriginThrottled,
    FailureOriginNoServers,
}

impl StatusCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Success => "SUCCESS",
            StatusCategory::FailureLocal => "FAILURE_LOCAL",
            StatusCategory::FailureLocalNoRoute => "FAILURE_LOCAL_NO_ROUTE",
            StatusCategory::FailureLocalIdleTimeout => "FAILURE_LOCAL_IDLE_TIMEOUT",
            StatusCategory::FailureLocalThrottledOriginConcurrency => {
                "FAILURE_LOCAL_THROTTLED_ORIGIN_CONCURRENCY"
            }
            StatusCategory::FailureLocalThrottledOriginServerConnection => {
                "FAILURE_LOCAL_THROTTLED_ORIGIN_SERVER_CONNECTION"
            }
            StatusCategory::FailureClientCancelled => "FAILURE_CLIENT_CANCELLED",
            StatusCategory::FailureClientBadRequest => "FAILURE_CLIENT_BAD_REQUEST",
            StatusCategory::FailureClientTimeout => "FAILURE_CLIENT_TIMEOUT",
            StatusCategory::FailureOrigin => "FAILURE_ORIGIN",
            StatusCategory::FailureOriginReadTimeout => "FAILURE_ORIGIN_READ_TIMEOUT",
            StatusCategory::FailureOriginConnectivity => "FAILURE_ORIGIN_CONNECTIVITY",
            StatusCategory::FailureOriginResetConnection => "FAILURE_ORIGIN_RESET_CONNECTION",
            StatusCategory::FailureOriginThrottled => "FAILURE_ORIGIN_THROTTLED",
            StatusCategory::FailureOriginNoServers => "FAILURE_ORIGIN_NO_SERVERS",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatusCategory::Success)
    }

    /// True for categories caused by the client rather than the gateway or an origin.
    pub fn is_client_failure(&self) -> bool {
        matches!(
            self,
            StatusCategory::FailureClientCancelled
                | StatusCategory::FailureClientBadRequest
                | StatusCategory::FailureClientTimeout
        )
    }

    /// Category for a response status received from an origin.
    pub fn from_origin_status(status: StatusCode) -> Self {
        if status == StatusCode::SERVICE_UNAVAILABLE {
            StatusCategory::FailureOriginThrottled
        } else if status.is_server_error() {
            StatusCategory::FailureOrigin
        } else {
            StatusCategory::Success
        }
    }
}

impl std::fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised anywhere in the request pipeline.
///
/// Variants carry only operator-facing detail. None of it is ever written to
/// the wire; error responses use the canonical reason phrase of
/// [`GatewayError::status_code`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// A filter returned an error or panicked.
    #[error("filter {filter} failed: {message}")]
    FilterExecution { filter: String, message: String },

    /// A filter was handed the wrong kind of message.
    #[error("filter {filter} requires a {expected} but received a {received}")]
    InvalidFilterInput {
        filter: String,
        expected: &'static str,
        received: &'static str,
    },

    /// A filter produced a message of a kind not allowed in its phase.
    #[error("filter {filter} must produce a {expected} but produced a {produced}")]
    InvalidFilterOutput {
        filter: String,
        expected: &'static str,
        produced: &'static str,
    },

    #[error("no endpoint was chosen for the request")]
    NoEndpointChosen,

    #[error("no endpoint filter named {0}")]
    NoEndpointFilterFound(String),

    #[error("origin {origin} concurrency exceeded: {in_flight} in flight, limit {limit}")]
    OriginConcurrencyExceeded {
        origin: String,
        in_flight: usize,
        limit: usize,
    },

    #[error("origin server {server} reached its connection limit of {limit}")]
    OriginServerMaxConnections { server: String, limit: usize },

    #[error("connect to {server} failed: {message}")]
    OriginConnectError { server: String, message: String },

    #[error("connect to {server} timed out after {timeout_ms}ms")]
    OriginConnectTimeout { server: String, timeout_ms: u64 },

    #[error("no response from {server} within {timeout_ms}ms")]
    OriginReadTimeout { server: String, timeout_ms: u64 },

    #[error("connection to {server} was reset: {message}")]
    OriginResetConnection { server: String, message: String },

    #[error("protocol error talking to {server}: {message}")]
    OriginProtocol { server: String, message: String },

    #[error("origin {0} has no available servers")]
    NoAvailableServers(String),

    #[error("unknown origin {0}")]
    UnknownOrigin(String),

    #[error("client cancelled the request")]
    ClientCancelled,

    #[error("timed out reading the request after {0}ms")]
    RequestReadTimeout(u64),

    #[error("request body exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    #[error("request carries {0} Host headers")]
    MultipleHostHeaders(usize),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("request did not complete within {0}ms")]
    Timeout(u64),
}

impl GatewayError {
    /// Stable, upper-case identifier used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::FilterExecution { .. } => "FILTER_EXECUTION",
            GatewayError::InvalidFilterInput { .. } => "INVALID_FILTER_INPUT",
            GatewayError::InvalidFilterOutput { .. } => "INVALID_FILTER_OUTPUT",
            GatewayError::NoEndpointChosen => "NO_ENDPOINT_CHOSEN",
            GatewayError::NoEndpointFilterFound(_) => "NO_ENDPOINT_FILTER_FOUND",
            GatewayError::OriginConcurrencyExceeded { .. } => "ORIGIN_CONCURRENCY_EXCEEDED",
            GatewayError::OriginServerMaxConnections { .. } => "ORIGIN_SERVER_MAX_CONNS",
            GatewayError::OriginConnectError { .. } => "ORIGIN_CONNECT_ERROR",
            GatewayError::OriginConnectTimeout { .. } => "ORIGIN_CONNECT_TIMEOUT",
            GatewayError::OriginReadTimeout { .. } => "ORIGIN_READ_TIMEOUT",
            GatewayError::OriginResetConnection { .. } => "ORIGIN_RESET_CONNECTION",
            GatewayError::OriginProtocol { .. } => "ORIGIN_PROTOCOL",
            GatewayError::NoAvailableServers(_) => "NO_AVAILABLE_SERVERS",
            GatewayError::UnknownOrigin(_) => "UNKNOWN_ORIGIN",
            GatewayError::ClientCancelled => "CLIENT_CANCELLED",
            GatewayError::RequestReadTimeout(_) => "REQUEST_READ_TIMEOUT",
            GatewayError::RequestTooLarge { .. } => "REQUEST_TOO_LARGE",
            GatewayError::MultipleHostHeaders(_) => "MULTIPLE_HOST_HEADERS",
            GatewayError::MalformedRequest(_) => "MALFORMED_REQUEST",
            GatewayError::Timeout(_) => "TIMEOUT",
        }
    }

    pub fn status_category(&self) -> StatusCategory {
        match self {
            GatewayError::FilterExecution { .. }
            | GatewayError::InvalidFilterInput { .. }
            | GatewayError::InvalidFilterOutput { .. }
            | GatewayError::NoEndpointChosen
            | GatewayError::NoEndpointFilterFound(_)
            | GatewayError::UnknownOrigin(_) => StatusCategory::FailureLocal,
            GatewayError::OriginConcurrencyExceeded { .. } => {
                StatusCategory::FailureLocalThrottledOriginConcurrency
            }
            GatewayError::OriginServerMaxConnections { .. } => {
                StatusCategory::FailureLocalThrottledOriginServerConnection
            }
            GatewayError::OriginConnectError { .. } | GatewayError::OriginConnectTimeout { .. } => {
                StatusCategory::FailureOriginConnectivity
            }
            GatewayError::OriginReadTimeout { .. } => StatusCategory::FailureOriginReadTimeout,
            GatewayError::OriginResetConnection { .. } => {
                StatusCategory::FailureOriginResetConnection
            }
            GatewayError::OriginProtocol { .. } => StatusCategory::FailureOrigin,
            GatewayError::NoAvailableServers(_) => StatusCategory::FailureOriginNoServers,
            GatewayError::ClientCancelled => StatusCategory::FailureClientCancelled,
            GatewayError::RequestReadTimeout(_) => StatusCategory::FailureClientTimeout,
            GatewayError::RequestTooLarge { .. }
            | GatewayError::MultipleHostHeaders(_)
            | GatewayError::MalformedRequest(_) => StatusCategory::FailureClientBadRequest,
            GatewayError::Timeout(_) => StatusCategory::FailureLocalIdleTimeout,
        }
    }

    /// HTTP status written to the client when this error ends the request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::OriginConcurrencyExceeded { .. }
            | GatewayError::OriginServerMaxConnections { .. }
            | GatewayError::NoAvailableServers(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::OriginConnectError { .. }
            | GatewayError::OriginResetConnection { .. }
            | GatewayError::OriginProtocol { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::OriginConnectTimeout { .. }
            | GatewayError::OriginReadTimeout { .. }
            | GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::RequestReadTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            GatewayError::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::MultipleHostHeaders(_) | GatewayError::MalformedRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            // Never written: the connection is closed instead.
            GatewayError::ClientCancelled => StatusCode::BAD_REQUEST,
            GatewayError::FilterExecution { .. }
            | GatewayError::InvalidFilterInput { .. }
            | GatewayError::InvalidFilterOutput { .. }
            | GatewayError::NoEndpointChosen
            | GatewayError::NoEndpointFilterFound(_)
            | GatewayError::UnknownOrigin(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a proxy attempt failing with this error may be retried on
    /// another server. An origin 503 is a response, not an error; its retry
    /// is decided by [`crate::resilience::RetryPolicy::should_retry_status`].
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::OriginConnectError { .. }
                | GatewayError::OriginConnectTimeout { .. }
                | GatewayError::OriginReadTimeout { .. }
                | GatewayError::OriginResetConnection { .. }
                | GatewayError::OriginServerMaxConnections { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_errors_are_retryable() {
        let err = GatewayError::OriginConnectError {
            server: "127.0.0.1:1".into(),
            message: "refused".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status_category(), StatusCategory::FailureOriginConnectivity);
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err = GatewayError::OriginConcurrencyExceeded {
            origin: "api".into(),
            in_flight: 2,
            limit: 2,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_client_errors_are_not_origin_failures() {
        for err in [
            GatewayError::RequestTooLarge { limit: 10 },
            GatewayError::MultipleHostHeaders(2),
            GatewayError::MalformedRequest("bad path".into()),
            GatewayError::RequestReadTimeout(100),
        ] {
            assert!(err.status_category().is_client_failure(), "{err}");
            assert!(err.status_code().is_client_error());
        }
    }

    #[test]
    fn test_read_timeouts_are_distinguished() {
        let client = GatewayError::RequestReadTimeout(10);
        let origin = GatewayError::OriginReadTimeout {
            server: "s".into(),
            timeout_ms: 10,
        };
        assert_ne!(client.status_category(), origin.status_category());
        assert_eq!(client.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(origin.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_origin_status_classification() {
        assert_eq!(
            StatusCategory::from_origin_status(StatusCode::OK),
            StatusCategory::Success
        );
        assert_eq!(
            StatusCategory::from_origin_status(StatusCode::SERVICE_UNAVAILABLE),
            StatusCategory::FailureOriginThrottled
        );
        assert_eq!(
            StatusCategory::from_origin_status(StatusCode::INTERNAL_SERVER_ERROR),
            StatusCategory::FailureOrigin
        );
    }
}
