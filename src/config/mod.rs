//! Gateway configuration: schema, loading, validation and hot reload.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader::parse_config (toml + serde defaults)
//!     → validation::validate_config (every problem reported at once)
//!     → ConfigHandle (ArcSwap<GatewayConfig>)
//!
//! watcher.rs sees the file change
//!     → same parse/validate path; a rejected file keeps the running config
//!     → HttpServer swaps the handle, rebuilds routes, re-applies origins
//! ```
//!
//! # Design Decisions
//! - A request loads the handle once and keeps that generation until it ends
//! - Every field defaults, so an empty file yields a gateway that answers 404

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

use std::sync::Arc;

use arc_swap::ArcSwap;

pub use schema::{
    AdminConfig, FilterConfig, GatewayConfig, LimitsConfig, ListenerConfig, LoadBalancerKind,
    LogFormat, ObservabilityConfig, OriginConfig, RouteConfig, TimeoutConfig,
};

/// Shared, atomically swappable configuration.
pub type ConfigHandle = Arc<ArcSwap<GatewayConfig>>;

pub fn config_handle(config: GatewayConfig) -> ConfigHandle {
    Arc::new(ArcSwap::from_pointee(config))
}
