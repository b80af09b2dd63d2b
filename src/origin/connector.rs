//! Origin connections.
//!
//! [`OriginConnector`] opens connections, [`OriginConnection`] sends one
//! request at a time over an open connection. The HTTP/1.1 implementation
//! runs on hyper's low-level client so that pooling stays under the
//! gateway's control.

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode, Version};
use futures_util::future::BoxFuture;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::errors::GatewayError;
use crate::origin::server::OriginServer;

/// A request ready to be written to an origin server.
#[derive(Debug, Clone)]
pub struct OriginRequest {
    pub method: Method,
    /// Origin-form target: path and query.
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Largest response body accepted.
    pub max_response_bytes: usize,
}

/// A fully buffered origin response.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// An open connection to one origin server.
pub trait OriginConnection: Send {
    fn send(&mut self, request: OriginRequest) -> BoxFuture<'_, Result<OriginResponse, GatewayError>>;

    /// Whether the connection may carry another request.
    fn is_reusable(&self) -> bool;
}

/// Opens connections to origin servers.
pub trait OriginConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        server: &'a OriginServer,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Box<dyn OriginConnection>, GatewayError>>;
}

/// Plain-text HTTP/1.1 connector.
#[derive(Debug, Default, Clone)]
pub struct HttpOriginConnector;

impl OriginConnector for HttpOriginConnector {
    fn connect<'a>(
        &'a self,
        server: &'a OriginServer,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Box<dyn OriginConnection>, GatewayError>> {
        Box::pin(async move {
            let addr = server.addr;
            let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| GatewayError::OriginConnectTimeout {
                    server: addr.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })?
                .map_err(|e| GatewayError::OriginConnectError {
                    server: addr.to_string(),
                    message: e.to_string(),
                })?;
            let _ = stream.set_nodelay(true);

            let (sender, conn) = http1::handshake::<_, Body>(TokioIo::new(stream))
                .await
                .map_err(|e| GatewayError::OriginConnectError {
                    server: addr.to_string(),
                    message: e.to_string(),
                })?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    tracing::debug!(server = %addr, error = %e, "Origin connection closed with error");
                }
            });

            tracing::debug!(server = %addr, "Opened origin connection");
            Ok(Box::new(HttpOriginConnection {
                server: addr.to_string(),
                sender,
                keep_alive: true,
            }) as Box<dyn OriginConnection>)
        })
    }
}

struct HttpOriginConnection {
    server: String,
    sender: http1::SendRequest<Body>,
    keep_alive: bool,
}

impl HttpOriginConnection {
    fn reset(&self, e: impl std::fmt::Display) -> GatewayError {
        GatewayError::OriginResetConnection {
            server: self.server.clone(),
            message: e.to_string(),
        }
    }
}

impl OriginConnection for HttpOriginConnection {
    fn send(&mut self, request: OriginRequest) -> BoxFuture<'_, Result<OriginResponse, GatewayError>> {
        Box::pin(async move {
            self.sender.ready().await.map_err(|e| self.reset(e))?;

            let mut builder = Request::builder().method(request.method).uri(request.uri.as_str());
            if let Some(headers) = builder.headers_mut() {
                *headers = request.headers;
                if !headers.contains_key(header::HOST) {
                    if let Ok(host) = self.server.parse() {
                        headers.insert(header::HOST, host);
                    }
                }
            }
            let req = builder
                .body(Body::from(request.body))
                .map_err(|e| GatewayError::OriginProtocol {
                    server: self.server.clone(),
                    message: e.to_string(),
                })?;

            let response = self.sender.send_request(req).await.map_err(|e| {
                if e.is_parse() || e.is_user() {
                    GatewayError::OriginProtocol {
                        server: self.server.clone(),
                        message: e.to_string(),
                    }
                } else {
                    self.reset(e)
                }
            })?;

            let (parts, body) = response.into_parts();
            let closes = parts.version == Version::HTTP_10
                || parts
                    .headers
                    .get(header::CONNECTION)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.eq_ignore_ascii_case("close"))
                    .unwrap_or(false);
            if closes {
                self.keep_alive = false;
            }

            let body = axum::body::to_bytes(Body::new(body), request.max_response_bytes)
                .await
                .map_err(|e| {
                    self.keep_alive = false;
                    self.reset(e)
                })?;

            Ok(OriginResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        })
    }

    fn is_reusable(&self) -> bool {
        self.keep_alive && !self.sender.is_closed()
    }
}
