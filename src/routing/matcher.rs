//! Request predicates used by routes.
//!
//! A route holds one [`AndMatcher`] built from its configured host and path
//! prefix. A route with neither condition matches every request.
//!
//! Host comparison ignores ASCII case and the port; path prefixes are
//! compared byte for byte.

use crate::message::HttpRequestMessage;

/// A condition a request must satisfy for a route to apply.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    fn matches(&self, req: &HttpRequestMessage) -> bool;
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &HttpRequestMessage) -> bool {
        req.host()
            .map(|h| h.eq_ignore_ascii_case(&self.expected_host))
            .unwrap_or(false)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &HttpRequestMessage) -> bool {
        req.path.starts_with(&self.prefix)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &HttpRequestMessage) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}
