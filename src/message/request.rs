//! Request messages.

use std::net::SocketAddr;

use axum::http::Method;

use crate::message::body::MessageBody;
use crate::message::headers::Headers;

/// Ordered, multi-valued query parameters.
///
/// Values are kept exactly as received (not percent-decoded) so that a
/// request is forwarded to the origin unchanged unless a filter edits it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string (without the leading `?`).
    pub fn parse(raw: &str) -> Self {
        let params = raw
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Self { params }
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.params
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.push((name.into(), value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.params.retain(|(k, _)| k != name);
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Re-encode as a query string (without the leading `?`).
    pub fn to_query_string(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// An inbound request as seen by the filter chain.
#[derive(Debug, Clone)]
pub struct HttpRequestMessage {
    /// Protocol version, e.g. `HTTP/1.1`.
    pub protocol: String,
    pub method: Method,
    pub path: String,
    pub query: QueryParams,
    pub headers: Headers,
    pub body: MessageBody,
    /// Whether the client announced a body (content-length or chunked).
    pub has_body: bool,
    pub client_addr: Option<SocketAddr>,
    /// `http` or `https`.
    pub scheme: String,
}

impl HttpRequestMessage {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            protocol: "HTTP/1.1".to_string(),
            method,
            path: path.into(),
            query: QueryParams::new(),
            headers: Headers::new(),
            body: MessageBody::empty(),
            has_body: false,
            client_addr: None,
            scheme: "http".to_string(),
        }
    }

    /// Value of the `Host` header, without any port.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get_first("host")
            .map(|h| match h.rsplit_once(':') {
                Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => host,
                _ => h,
            })
    }

    /// Origin-form request target: path plus encoded query.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query.to_query_string())
        }
    }

    /// Copy of this request without its body, used as the originating
    /// request carried by a response.
    pub fn without_body(&self) -> Self {
        Self {
            protocol: self.protocol.clone(),
            method: self.method.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            headers: self.headers.clone(),
            body: MessageBody::empty(),
            has_body: false,
            client_addr: self.client_addr,
            scheme: self.scheme.clone(),
        }
    }

    /// One-line description for debug traces.
    pub fn summary(&self) -> String {
        format!(
            "{} {} {} headers={} body={}B",
            self.method,
            self.path_and_query(),
            self.protocol,
            self.headers.len(),
            self.body.len()
        )
    }
}
