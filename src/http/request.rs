//! Request decoding and validation.
//!
//! # Responsibilities
//! - Assign the request ID (client-supplied or UUID v4)
//! - Decode an axum request head into an [`HttpRequestMessage`]
//! - Validate headers and path before the chain sees the request
//! - Buffer the body under a size limit and a read timeout
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Header limits enforced before the body is read
//! - Validation failures become context errors, rendered by the error endpoint

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method};
use futures_util::StreamExt;
use uuid::Uuid;

use crate::config::LimitsConfig;
use crate::errors::GatewayError;
use crate::message::{Headers, HttpRequestMessage, MessageBody, QueryParams};

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Longest client-supplied request ID that is kept.
const MAX_REQUEST_ID_LEN: usize = 128;

/// The client's request ID if it is usable, otherwise a fresh UUID v4.
pub fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Decode a request head. The body is attached separately.
pub fn build_request_message(
    headers: &HeaderMap,
    method: Method,
    path: &str,
    query: Option<&str>,
    client_addr: Option<SocketAddr>,
    scheme: &str,
) -> HttpRequestMessage {
    let mut req = HttpRequestMessage::new(method, path);
    req.headers = Headers::from_header_map(headers);
    req.query = query.map(QueryParams::parse).unwrap_or_default();
    req.client_addr = client_addr;
    req.scheme = scheme.to_string();
    req.has_body = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|len| len > 0)
        .unwrap_or_else(|| headers.contains_key(header::TRANSFER_ENCODING));
    req
}

/// Reject requests the gateway must not forward.
pub fn validate_request(req: &HttpRequestMessage, limits: &LimitsConfig) -> Result<(), GatewayError> {
    let hosts = req.headers.count("host");
    if hosts > 1 {
        return Err(GatewayError::MultipleHostHeaders(hosts));
    }
    if req.headers.len() > limits.max_header_count {
        return Err(GatewayError::MalformedRequest(format!(
            "{} headers exceed the limit of {}",
            req.headers.len(),
            limits.max_header_count
        )));
    }
    if !req.path.starts_with('/') {
        return Err(GatewayError::MalformedRequest(format!("path {:?} is not absolute", req.path)));
    }
    if req.path.split('/').any(|segment| segment == "..") {
        return Err(GatewayError::MalformedRequest("path traversal".to_string()));
    }
    Ok(())
}

/// Buffer the request body chunk by chunk.
pub async fn read_body(body: Body, max_size: usize, timeout: Duration) -> Result<MessageBody, GatewayError> {
    let read = async {
        let mut buffered = MessageBody::empty();
        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| GatewayError::MalformedRequest(format!("body read failed: {e}")))?;
            if buffered.len() + chunk.len() > max_size {
                return Err(GatewayError::RequestTooLarge { limit: max_size });
            }
            buffered.push_chunk(chunk);
        }
        Ok(buffered)
    };

    tokio::time::timeout(timeout, read)
        .await
        .map_err(|_| GatewayError::RequestReadTimeout(timeout.as_millis() as u64))?
}
