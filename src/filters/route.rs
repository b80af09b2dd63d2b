//! Inbound routing filter.

use axum::http::StatusCode;

use crate::context::SessionContext;
use crate::errors::StatusCategory;
use crate::filter::{Filter, FilterOutput, FilterType};
use crate::filters::PROXY_ENDPOINT;
use crate::message::{HttpMessage, HttpResponseMessage};
use crate::routing::RouterHandle;

pub const NAME: &str = "inbound.RouteFilter";

/// Picks the endpoint and origin for a request from the current route table.
/// Unrouted requests get a static 404.
pub struct RouteFilter {
    router: RouterHandle,
}

impl RouteFilter {
    pub fn new(router: RouterHandle) -> Self {
        Self { router }
    }
}

impl Filter for RouteFilter {
    fn name(&self) -> &str {
        NAME
    }

    fn filter_type(&self) -> FilterType {
        FilterType::Inbound
    }

    fn order(&self) -> i32 {
        50
    }

    /// Earlier filters may already have routed the request.
    fn should_filter(&self, _msg: &HttpMessage, ctx: &SessionContext) -> bool {
        ctx.endpoint().is_none() && ctx.static_response().is_none()
    }

    fn apply(&self, msg: &mut HttpMessage, ctx: &mut SessionContext) -> FilterOutput {
        let req = msg.request();
        let router = self.router.load();
        match router.match_request(req) {
            Some(route) => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    route = %route.name,
                    origin = %route.origin,
                    "Route matched"
                );
                ctx.set_route_vip(route.origin.as_str());
                ctx.set_endpoint(route.endpoint.as_deref().unwrap_or(PROXY_ENDPOINT));
            }
            None => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    host = req.host().unwrap_or("-"),
                    path = %req.path,
                    "No route matched"
                );
                ctx.set_static_response(HttpResponseMessage::error(req.without_body(), StatusCode::NOT_FOUND));
                ctx.set_status_category(StatusCategory::FailureLocalNoRoute);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::Method;

    use crate::config::{GatewayConfig, RouteConfig};
    use crate::message::HttpRequestMessage;
    use crate::routing::router_handle;

    fn filter() -> RouteFilter {
        let config = GatewayConfig {
            routes: vec![RouteConfig {
                name: "api".into(),
                host: None,
                path_prefix: Some("/api".into()),
                origin: "api-origin".into(),
                endpoint: None,
                priority: 0,
            }],
            ..Default::default()
        };
        RouteFilter::new(router_handle(&config))
    }

    fn ctx() -> SessionContext {
        SessionContext::new(Arc::new(GatewayConfig::default()))
    }

    #[test]
    fn test_matched_route_sets_endpoint() {
        let mut ctx = ctx();
        let mut msg = HttpMessage::Request(HttpRequestMessage::new(Method::GET, "/api/users"));
        assert!(filter().should_filter(&msg, &ctx));
        filter().apply(&mut msg, &mut ctx).unwrap();
        assert_eq!(ctx.endpoint(), Some(PROXY_ENDPOINT));
        assert_eq!(ctx.route_vip(), Some("api-origin"));
    }

    #[test]
    fn test_unmatched_route_sets_static_404() {
        let mut ctx = ctx();
        let mut msg = HttpMessage::Request(HttpRequestMessage::new(Method::GET, "/other"));
        filter().apply(&mut msg, &mut ctx).unwrap();
        assert_eq!(ctx.static_response().unwrap().status, StatusCode::NOT_FOUND);
        assert_eq!(ctx.status_category(), Some(StatusCategory::FailureLocalNoRoute));
        assert!(!filter().should_filter(&msg, &ctx));
    }
}
