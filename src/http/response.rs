//! Response encoding.
//!
//! # Responsibilities
//! - Turn the chain's [`HttpResponseMessage`] into an axum response
//! - Build bare error responses for failures outside the chain
//!
//! # Design Decisions
//! - Content-Length is recomputed from the buffered body, since filters may
//!   have rewritten it
//! - Error bodies carry the reason phrase only, never internal detail

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

use crate::http::request::X_REQUEST_ID;
use crate::message::HttpResponseMessage;

pub fn into_axum_response(message: HttpResponseMessage) -> Response {
    let mut headers = message.headers.to_header_map();
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);

    let mut response = Response::new(Body::from(message.body.to_bytes()));
    *response.status_mut() = message.status;
    *response.headers_mut() = headers;
    response
}

/// Plain-text error response for a request the chain never answered.
pub fn error_response(status: StatusCode, request_id: &str) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut response = Response::new(Body::from(reason));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    if let Ok(id) = HeaderValue::from_str(request_id) {
        headers.insert(X_REQUEST_ID, id);
    }
    response
}
