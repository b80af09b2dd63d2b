//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Configure log level from config, overridable through `RUST_LOG`
//! - Emit the per-request access log
//!
//! # Design Decisions
//! - Pretty format for development, compact single-line format for production
//! - Access log events go to their own target so they can be filtered apart

use std::time::Duration;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::context::SessionContext;

/// Target of access log events.
pub const ACCESS_LOG_TARGET: &str = "access_log";

/// Install the global subscriber. Calling it twice is harmless; the second
/// call is ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = match config.log_format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty().with_target(true)).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact().with_target(true)).try_init(),
    };
}

/// One access log line for a finished request.
pub fn log_access(ctx: &SessionContext, method: &str, path: &str, status: u16, elapsed: Duration) {
    let category = ctx.status_category().map(|c| c.as_str()).unwrap_or("UNKNOWN");
    tracing::info!(
        target: ACCESS_LOG_TARGET,
        request_id = %ctx.request_id(),
        method,
        path,
        status,
        category,
        origin = ctx.route_vip().unwrap_or("-"),
        attempts = ctx.request_attempts().len(),
        duration_ms = elapsed.as_millis() as u64,
        filters = %ctx.execution_summary(),
        "Request completed"
    );
}
