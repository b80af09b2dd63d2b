//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a request
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction; a reload builds a new router
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Ties in priority keep configuration order

use crate::config::RouteConfig;
use crate::message::HttpRequestMessage;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub origin: String,
    /// Endpoint filter override; `None` means the proxy endpoint.
    pub endpoint: Option<String>,
    pub priority: u32,
    matcher: AndMatcher,
}

impl Route {
    pub fn from_config(config: &RouteConfig) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host.as_str())));
        }
        if let Some(prefix) = &config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix.as_str())));
        }
        Self {
            name: config.name.clone(),
            origin: config.origin.clone(),
            endpoint: config.endpoint.clone(),
            priority: config.priority,
            matcher: AndMatcher::new(matchers),
        }
    }

    pub fn matches(&self, req: &HttpRequestMessage) -> bool {
        self.matcher.matches(req)
    }
}

/// Routes ordered by descending priority.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        let mut routes: Vec<Route> = configs.iter().map(Route::from_config).collect();
        // Stable sort keeps configuration order within a priority.
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { routes }
    }

    /// First route, by priority, that matches `req`.
    pub fn match_request(&self, req: &HttpRequestMessage) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(req))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn route(name: &str, host: Option<&str>, prefix: Option<&str>, priority: u32) -> RouteConfig {
        RouteConfig {
            name: name.into(),
            host: host.map(String::from),
            path_prefix: prefix.map(String::from),
            origin: format!("{name}-origin"),
            endpoint: None,
            priority,
        }
    }

    fn request(host: &str, path: &str) -> HttpRequestMessage {
        let mut req = HttpRequestMessage::new(Method::GET, path);
        req.headers.set("Host", host);
        req
    }

    #[test]
    fn test_priority_order() {
        let router = Router::from_config(&[
            route("catch_all", None, None, 0),
            route("api", None, Some("/api"), 10),
            route("api_v2", Some("api.example.com"), Some("/api"), 20),
        ]);
        assert_eq!(router.match_request(&request("api.example.com", "/api/x")).unwrap().name, "api_v2");
        assert_eq!(router.match_request(&request("example.com", "/api/x")).unwrap().name, "api");
        assert_eq!(router.match_request(&request("example.com", "/")).unwrap().name, "catch_all");
    }

    #[test]
    fn test_no_match() {
        let router = Router::from_config(&[route("api", None, Some("/api"), 0)]);
        assert!(router.match_request(&request("example.com", "/static")).is_none());
        assert!(Router::default().match_request(&request("example.com", "/")).is_none());
    }

    #[test]
    fn test_equal_priority_keeps_config_order() {
        let router = Router::from_config(&[route("first", None, Some("/"), 1), route("second", None, Some("/"), 1)]);
        assert_eq!(router.match_request(&request("h", "/x")).unwrap().name, "first");
    }
}
