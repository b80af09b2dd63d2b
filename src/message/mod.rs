//! Request/response message model.
//!
//! # Data Flow
//! ```text
//! transport adapter decodes a request
//!     → HttpMessage::Request (inbound filters mutate or replace it)
//!     → endpoint filter produces HttpMessage::Response
//!     → outbound filters mutate or replace the response
//!     → transport adapter writes it, buffers are released
//! ```
//!
//! # Design Decisions
//! - One enum for both kinds so a single filter contract covers every phase
//! - A response owns a body-less copy of its originating request
//! - The per-request context travels next to the message, never inside it

pub mod body;
pub mod headers;
pub mod request;
pub mod response;

pub use body::MessageBody;
pub use headers::Headers;
pub use request::{HttpRequestMessage, QueryParams};
pub use response::HttpResponseMessage;

/// A message flowing through the filter chain.
#[derive(Debug, Clone)]
pub enum HttpMessage {
    Request(HttpRequestMessage),
    Response(HttpResponseMessage),
}

impl HttpMessage {
    /// `"request"` or `"response"`.
    pub fn kind(&self) -> &'static str {
        match self {
            HttpMessage::Request(_) => "request",
            HttpMessage::Response(_) => "response",
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, HttpMessage::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, HttpMessage::Response(_))
    }

    pub fn as_request(&self) -> Option<&HttpRequestMessage> {
        match self {
            HttpMessage::Request(r) => Some(r),
            HttpMessage::Response(_) => None,
        }
    }

    pub fn as_request_mut(&mut self) -> Option<&mut HttpRequestMessage> {
        match self {
            HttpMessage::Request(r) => Some(r),
            HttpMessage::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&HttpResponseMessage> {
        match self {
            HttpMessage::Response(r) => Some(r),
            HttpMessage::Request(_) => None,
        }
    }

    pub fn as_response_mut(&mut self) -> Option<&mut HttpResponseMessage> {
        match self {
            HttpMessage::Response(r) => Some(r),
            HttpMessage::Request(_) => None,
        }
    }

    /// The request itself, or the originating request of a response.
    pub fn into_request(self) -> HttpRequestMessage {
        match self {
            HttpMessage::Request(r) => r,
            HttpMessage::Response(r) => *r.request,
        }
    }

    /// The originating request, borrowed.
    pub fn request(&self) -> &HttpRequestMessage {
        match self {
            HttpMessage::Request(r) => r,
            HttpMessage::Response(r) => &r.request,
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            HttpMessage::Request(r) => &r.headers,
            HttpMessage::Response(r) => &r.headers,
        }
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        match self {
            HttpMessage::Request(r) => &mut r.headers,
            HttpMessage::Response(r) => &mut r.headers,
        }
    }

    pub fn body(&self) -> &MessageBody {
        match self {
            HttpMessage::Request(r) => &r.body,
            HttpMessage::Response(r) => &r.body,
        }
    }

    pub fn body_mut(&mut self) -> &mut MessageBody {
        match self {
            HttpMessage::Request(r) => &mut r.body,
            HttpMessage::Response(r) => &mut r.body,
        }
    }

    /// Release buffered body memory of the message and its originating request.
    pub fn dispose_body(&mut self) {
        match self {
            HttpMessage::Request(r) => r.body.dispose(),
            HttpMessage::Response(r) => {
                r.body.dispose();
                r.request.body.dispose();
            }
        }
    }

    pub fn summary(&self) -> String {
        match self {
            HttpMessage::Request(r) => r.summary(),
            HttpMessage::Response(r) => r.summary(),
        }
    }
}

impl From<HttpRequestMessage> for HttpMessage {
    fn from(r: HttpRequestMessage) -> Self {
        HttpMessage::Request(r)
    }
}

impl From<HttpResponseMessage> for HttpMessage {
    fn from(r: HttpResponseMessage) -> Self {
        HttpMessage::Response(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};

    #[test]
    fn test_into_request_from_response() {
        let req = HttpRequestMessage::new(Method::GET, "/a");
        let msg = HttpMessage::from(HttpResponseMessage::new(&req, StatusCode::OK));
        assert_eq!(msg.kind(), "response");
        assert_eq!(msg.request().path, "/a");
        assert_eq!(msg.into_request().path, "/a");
    }

    #[test]
    fn test_dispose_body() {
        let mut req = HttpRequestMessage::new(Method::POST, "/");
        req.body = MessageBody::from("abc");
        let mut msg = HttpMessage::from(req);
        msg.dispose_body();
        assert!(msg.body().is_empty());
    }
}
