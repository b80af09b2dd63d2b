//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing origins)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::filter::FilterType;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: String, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("origin name must not be empty")]
    UnnamedOrigin,

    #[error("origin {0} is defined more than once")]
    DuplicateOrigin(String),

    #[error("origin {0} has no servers")]
    NoServers(String),

    #[error("route {route} references unknown origin {origin}")]
    UnknownOrigin { route: String, origin: String },

    #[error("route {0} is defined more than once")]
    DuplicateRoute(String),

    #[error("disabled filter entry {0:?} has an unknown filter type")]
    UnknownFilterType(String),

    #[error("filters.default_error_endpoint must not be empty")]
    NoDefaultErrorEndpoint,
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_positive(&mut errors, "listener.max_connections", config.listener.max_connections as u64);
    check_positive(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);
    check_positive(&mut errors, "timeouts.read_secs", config.timeouts.read_secs);
    check_positive(&mut errors, "limits.max_body_size", config.limits.max_body_size as u64);
    check_positive(&mut errors, "limits.max_header_count", config.limits.max_header_count as u64);

    if config.filters.default_error_endpoint.is_empty() {
        errors.push(ValidationError::NoDefaultErrorEndpoint);
    }
    for entry in &config.filters.disabled {
        if let Some((t, _)) = entry.split_once(':') {
            if !FilterType::ALL.iter().any(|ft| ft.as_str().eq_ignore_ascii_case(t)) {
                errors.push(ValidationError::UnknownFilterType(entry.clone()));
            }
        }
    }

    let mut origin_names = HashSet::new();
    for origin in &config.origins {
        if origin.name.is_empty() {
            errors.push(ValidationError::UnnamedOrigin);
            continue;
        }
        if !origin_names.insert(origin.name.as_str()) {
            errors.push(ValidationError::DuplicateOrigin(origin.name.clone()));
        }
        if origin.servers.is_empty() {
            errors.push(ValidationError::NoServers(origin.name.clone()));
        }
        for server in &origin.servers {
            check_address(&mut errors, &format!("origins.{}.servers", origin.name), server);
        }
        let field = |f: &str| format!("origins.{}.{}", origin.name, f);
        check_positive(&mut errors, &field("max_concurrent_requests"), origin.max_concurrent_requests as u64);
        check_positive(&mut errors, &field("max_connections_per_server"), origin.max_connections_per_server as u64);
        check_positive(&mut errors, &field("connect_timeout_ms"), origin.connect_timeout_ms);
        check_positive(&mut errors, &field("read_timeout_ms"), origin.read_timeout_ms);
        check_positive(&mut errors, &field("unhealthy_threshold"), origin.unhealthy_threshold as u64);
        check_positive(&mut errors, &field("healthy_threshold"), origin.healthy_threshold as u64);
    }

    let mut route_names = HashSet::new();
    for route in &config.routes {
        if !route_names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        if !origin_names.contains(route.origin.as_str()) {
            errors.push(ValidationError::UnknownOrigin {
                route: route.name.clone(),
                origin: route.origin.clone(),
            });
        }
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero {
            field: field.to_string(),
        });
    }
}
