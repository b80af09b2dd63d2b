//! Edge HTTP gateway built around an ordered filter chain.

pub mod admin;
pub mod config;
pub mod context;
pub mod errors;
pub mod filter;
pub mod filters;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod message;
pub mod observability;
pub mod origin;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use errors::{GatewayError, StatusCategory};
pub use filter::{Filter, FilterChain, FilterType};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
