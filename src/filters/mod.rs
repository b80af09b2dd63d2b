//! Built-in filters.
//!
//! # Data Flow
//! ```text
//! INBOUND   inbound.RouteFilter (50)       → endpoint + route VIP, or static 404
//! ENDPOINT  endpoint.ProxyEndpoint (async) → origin attempt loop
//!           endpoint.ErrorResponse         → generic error response
//! OUTBOUND  outbound.ResponseHeaders (10)  → X-Request-ID, Server, debug headers
//! ```

pub mod error_response;
pub mod proxy_endpoint;
pub mod response_headers;
pub mod route;

use std::sync::Arc;

use crate::filter::Filter;
use crate::origin::OriginManager;
use crate::routing::RouterHandle;

pub use error_response::ErrorResponseEndpoint;
pub use proxy_endpoint::ProxyEndpoint;
pub use response_headers::ResponseHeadersFilter;
pub use route::RouteFilter;

pub const PROXY_ENDPOINT: &str = "endpoint.ProxyEndpoint";
pub const ERROR_RESPONSE_ENDPOINT: &str = "endpoint.ErrorResponse";

/// The filters every gateway runs unless configured otherwise.
pub fn builtin_filters(router: RouterHandle, origins: Arc<OriginManager>) -> Vec<Arc<dyn Filter>> {
    vec![
        Arc::new(RouteFilter::new(router)),
        Arc::new(ProxyEndpoint::new(origins)),
        Arc::new(ErrorResponseEndpoint),
        Arc::new(ResponseHeadersFilter),
    ]
}
