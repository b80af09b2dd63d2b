//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! HttpRequestMessage (host, path)
//!     → router.rs (route lookup, priority order)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route or None
//!
//! Route Compilation (startup and every reload):
//!     RouteConfig[]
//!     → Sort by priority
//!     → Compile matchers
//!     → Freeze as immutable Router behind an ArcSwap
//! ```
//!
//! # Design Decisions
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by priority)

pub mod matcher;
pub mod router;

pub use router::{Route, Router};

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::GatewayConfig;

/// Current route table, swapped on config reload.
pub type RouterHandle = Arc<ArcSwap<Router>>;

pub fn router_handle(config: &GatewayConfig) -> RouterHandle {
    Arc::new(ArcSwap::from_pointee(Router::from_config(&config.routes)))
}
