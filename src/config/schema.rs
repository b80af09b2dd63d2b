//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::filter::FilterType;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Inbound request limits.
    pub limits: LimitsConfig,

    /// Filter chain settings.
    pub filters: FilterConfig,

    /// Origin definitions.
    pub origins: Vec<OriginConfig>,

    /// Route definitions mapping requests to origins.
    pub routes: Vec<RouteConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

impl GatewayConfig {
    pub fn origin(&self, name: &str) -> Option<&OriginConfig> {
        self.origins.iter().find(|o| o.name == name)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent requests being processed (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Overall deadline for processing one request, in seconds.
    pub request_secs: u64,

    /// Deadline for reading the client's request body, in seconds.
    pub read_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            read_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Maximum number of request headers.
    pub max_header_count: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            max_header_count: 100,
        }
    }
}

/// Filter chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Filters disabled at runtime, as `name` or `type:name`
    /// (e.g. `"inbound:auth"`).
    pub disabled: Vec<String>,

    /// Endpoint used to render error responses when the request did not
    /// choose one.
    pub default_error_endpoint: String,

    /// Request header that turns on per-request debug tracing.
    pub debug_header: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            default_error_endpoint: "endpoint.ErrorResponse".to_string(),
            debug_header: "X-Gateway-Debug".to_string(),
        }
    }
}

impl FilterConfig {
    pub fn is_disabled(&self, filter_type: FilterType, name: &str) -> bool {
        self.disabled.iter().any(|entry| match entry.split_once(':') {
            Some((t, n)) => t.eq_ignore_ascii_case(filter_type.as_str()) && n == name,
            None => entry == name,
        })
    }
}

/// Server selection strategy for an origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerKind {
    #[default]
    RoundRobin,
    LeastConnections,
}

/// A named group of servers requests can be proxied to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Unique origin name, referenced by routes.
    pub name: String,

    /// Server addresses (e.g., "127.0.0.1:3000").
    pub servers: Vec<String>,

    pub load_balancer: LoadBalancerKind,

    /// Ceiling on requests in flight to this origin.
    pub max_concurrent_requests: usize,

    /// Maximum concurrent connections to each server.
    pub max_connections_per_server: usize,

    /// Additional attempts after the first one fails.
    pub max_retries: u32,

    pub connect_timeout_ms: u64,

    /// Deadline for the origin's response, per attempt.
    pub read_timeout_ms: u64,

    /// Treat a 503 from the origin as retryable.
    pub retry_on_503: bool,

    /// Base delay for exponential backoff in milliseconds.
    pub retry_backoff_base_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub retry_backoff_max_ms: u64,

    /// Largest response body accepted from a server.
    pub max_response_body_size: usize,

    /// Consecutive failures before a server is taken out of rotation.
    pub unhealthy_threshold: usize,

    /// Consecutive successes before a server is put back.
    pub healthy_threshold: usize,

    /// How long an unhealthy server is skipped before it is tried again.
    pub ejection_cooldown_ms: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            servers: Vec::new(),
            load_balancer: LoadBalancerKind::RoundRobin,
            max_concurrent_requests: 1_000,
            max_connections_per_server: 100,
            max_retries: 1,
            connect_timeout_ms: 2_000,
            read_timeout_ms: 10_000,
            retry_on_503: false,
            retry_backoff_base_ms: 20,
            retry_backoff_max_ms: 500,
            max_response_body_size: 10 * 1024 * 1024,
            unhealthy_threshold: 5,
            healthy_threshold: 1,
            ejection_cooldown_ms: 10_000,
        }
    }
}

/// Route configuration mapping requests to origins.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Origin to forward to.
    pub origin: String,

    /// Endpoint filter that handles the request (default: the proxy endpoint).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Emit one `access_log` event per request.
    pub access_log: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            access_log: true,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[origins]]
            name = "api"
            servers = ["127.0.0.1:3000"]
            load_balancer = "least_connections"

            [[routes]]
            name = "all"
            path_prefix = "/"
            origin = "api"
            "#,
        )
        .unwrap();
        assert_eq!(config.filters.default_error_endpoint, "endpoint.ErrorResponse");
        let origin = config.origin("api").unwrap();
        assert_eq!(origin.load_balancer, LoadBalancerKind::LeastConnections);
        assert_eq!(origin.max_retries, 1);
        assert!(config.routes[0].endpoint.is_none());
    }

    #[test]
    fn test_disabled_filter_matching() {
        let filters = FilterConfig {
            disabled: vec!["auth".into(), "outbound:headers".into()],
            ..Default::default()
        };
        assert!(filters.is_disabled(FilterType::Inbound, "auth"));
        assert!(filters.is_disabled(FilterType::Outbound, "auth"));
        assert!(filters.is_disabled(FilterType::Outbound, "headers"));
        assert!(!filters.is_disabled(FilterType::Inbound, "headers"));
    }
}
