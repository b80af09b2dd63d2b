//! Response messages.

use axum::http::StatusCode;

use crate::message::body::MessageBody;
use crate::message::headers::Headers;
use crate::message::request::HttpRequestMessage;

/// A response flowing back through the outbound filters.
#[derive(Debug, Clone)]
pub struct HttpResponseMessage {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: MessageBody,
    pub has_body: bool,
    /// The request this response answers, without its body.
    pub request: Box<HttpRequestMessage>,
}

impl HttpResponseMessage {
    /// Empty response answering `request`.
    pub fn new(request: &HttpRequestMessage, status: StatusCode) -> Self {
        Self::for_request(request.without_body(), status)
    }

    /// Empty response taking ownership of the originating request. Any
    /// request body is released.
    pub fn for_request(mut request: HttpRequestMessage, status: StatusCode) -> Self {
        request.body.dispose();
        request.has_body = false;
        Self {
            status,
            headers: Headers::new(),
            body: MessageBody::empty(),
            has_body: false,
            request: Box::new(request),
        }
    }

    /// Generic error response: canonical reason phrase as a plain-text body,
    /// no internal detail.
    pub fn error(request: HttpRequestMessage, status: StatusCode) -> Self {
        let mut response = Self::for_request(request, status);
        let reason = status.canonical_reason().unwrap_or("Error");
        response.set_body_text("text/plain; charset=utf-8", reason.to_string());
        response
    }

    /// The synthesized 500 used whenever no filter produced a response.
    pub fn default_error(request: HttpRequestMessage) -> Self {
        Self::error(request, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Replace the body and set its content type.
    pub fn set_body_text(&mut self, content_type: &str, text: impl Into<String>) {
        self.body = MessageBody::from(text.into());
        self.has_body = !self.body.is_empty();
        self.headers.set("Content-Type", content_type);
    }

    pub fn summary(&self) -> String {
        format!(
            "{} for {} {} headers={} body={}B",
            self.status.as_u16(),
            self.request.method,
            self.request.path,
            self.headers.len(),
            self.body.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn test_error_response_is_generic() {
        let req = HttpRequestMessage::new(Method::GET, "/secret");
        let resp = HttpResponseMessage::error(req, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.body.to_text(), "Service Unavailable");
        assert!(resp.has_body);
        assert_eq!(resp.request.path, "/secret");
    }

    #[test]
    fn test_for_request_releases_request_body() {
        let mut req = HttpRequestMessage::new(Method::POST, "/");
        req.body = MessageBody::from("x");
        let resp = HttpResponseMessage::for_request(req, StatusCode::OK);
        assert!(resp.request.body.is_empty());
        assert!(!resp.has_body);
    }
}
