//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, filters, origins)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by status category, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_active_requests` (gauge): requests being processed
//! - `gateway_filter_executions_total` (counter): by filter, type, status
//! - `gateway_origin_in_flight` (gauge): in-flight requests per origin
//! - `gateway_origin_attempts_total` (counter): attempts by origin, outcome
//! - `gateway_origin_outcomes_total` (counter): final outcome per origin
//! - `gateway_config_reloads_total` (counter): by result
//!
//! # Design Decisions
//! - Low-overhead metric updates through the `metrics` facade
//! - Labels stay low-cardinality: never paths or request ids

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(category: &'static str, status: u16, duration: Duration) {
    counter!(
        "gateway_requests_total",
        "category" => category,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "category" => category).record(duration.as_secs_f64());
}

pub fn record_active_requests(active: usize) {
    gauge!("gateway_active_requests").set(active as f64);
}

pub fn record_filter_execution(filter: &str, filter_type: &'static str, status: &'static str) {
    counter!(
        "gateway_filter_executions_total",
        "filter" => filter.to_string(),
        "type" => filter_type,
        "status" => status
    )
    .increment(1);
}

pub fn record_origin_in_flight(origin: &str, in_flight: usize) {
    gauge!("gateway_origin_in_flight", "origin" => origin.to_string()).set(in_flight as f64);
}

pub fn record_origin_attempt(origin: &str, outcome: &'static str) {
    counter!(
        "gateway_origin_attempts_total",
        "origin" => origin.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_origin_outcome(origin: &str, category: &'static str) {
    counter!(
        "gateway_origin_outcomes_total",
        "origin" => origin.to_string(),
        "category" => category
    )
    .increment(1);
}

pub fn record_config_reload(result: &'static str) {
    counter!("gateway_config_reloads_total", "result" => result).increment(1);
}
