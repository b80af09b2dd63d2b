//! Per-server connection pooling.
//!
//! # Responsibilities
//! - Keep idle keep-alive connections per server
//! - Hand out a [`PooledConnection`] that is released exactly once
//!
//! # Design Decisions
//! - A connection that saw an error or a timeout is never pooled again
//! - A connection dropped while a send is outstanding is closed, since the
//!   origin may still write the abandoned response on it
//! - The connection slot (active count) is released by the guard's drop,
//!   independent of whether the connection itself is kept

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::GatewayError;
use crate::origin::connector::{OriginConnection, OriginRequest, OriginResponse};
use crate::origin::server::{OriginServer, ServerConnectionGuard};

/// Idle connections of one server.
pub struct ConnectionPool {
    idle: Mutex<Vec<Box<dyn OriginConnection>>>,
    max_idle: AtomicUsize,
}

impl ConnectionPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle: AtomicUsize::new(max_idle),
        }
    }

    pub fn set_max_idle(&self, max_idle: usize) {
        self.max_idle.store(max_idle, Ordering::Relaxed);
    }

    /// Most recently returned connection that is still usable.
    pub fn take(&self) -> Option<Box<dyn OriginConnection>> {
        let mut idle = self.idle.lock().expect("connection pool mutex poisoned");
        while let Some(conn) = idle.pop() {
            if conn.is_reusable() {
                return Some(conn);
            }
        }
        None
    }

    fn give_back(&self, conn: Box<dyn OriginConnection>) {
        let mut idle = self.idle.lock().expect("connection pool mutex poisoned");
        if idle.len() < self.max_idle.load(Ordering::Relaxed) {
            idle.push(conn);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().expect("connection pool mutex poisoned").len()
    }

    /// Close every idle connection.
    pub fn clear(&self) {
        self.idle.lock().expect("connection pool mutex poisoned").clear();
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// A checked-out connection. Dropping it returns the connection to its
/// server's pool (or closes it) and frees the connection slot.
pub struct PooledConnection {
    conn: Option<Box<dyn OriginConnection>>,
    slot: ServerConnectionGuard,
    reused: bool,
    reusable: bool,
    /// Set while a request is outstanding on the connection.
    busy: bool,
}

impl PooledConnection {
    pub(crate) fn new(conn: Box<dyn OriginConnection>, slot: ServerConnectionGuard, reused: bool) -> Self {
        Self {
            conn: Some(conn),
            slot,
            reused,
            reusable: true,
            busy: false,
        }
    }

    pub fn server(&self) -> &Arc<OriginServer> {
        self.slot.server()
    }

    /// Whether the connection came from the idle pool.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Close the connection instead of pooling it on release.
    pub fn discard(&mut self) {
        self.reusable = false;
    }

    pub async fn send(&mut self, request: OriginRequest) -> Result<OriginResponse, GatewayError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(GatewayError::OriginResetConnection {
                server: self.slot.addr.to_string(),
                message: "connection already released".to_string(),
            });
        };
        self.busy = true;
        let result = conn.send(request).await;
        match &result {
            Ok(_) => self.busy = false,
            Err(_) => self.reusable = false,
        }
        result
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.reusable && !self.busy && conn.is_reusable() {
                self.slot.pool.give_back(conn);
            } else {
                tracing::trace!(server = %self.slot.addr, "Closing origin connection");
            }
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("server", &self.slot.addr)
            .field("reused", &self.reused)
            .field("reusable", &self.reusable)
            .field("busy", &self.busy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use futures_util::future::BoxFuture;

    struct Fake {
        reusable: bool,
    }

    /// A connection whose origin never answers.
    struct Stalled;

    impl OriginConnection for Stalled {
        fn send(&mut self, _request: OriginRequest) -> BoxFuture<'_, Result<OriginResponse, GatewayError>> {
            Box::pin(futures_util::future::pending::<Result<OriginResponse, GatewayError>>())
        }

        fn is_reusable(&self) -> bool {
            true
        }
    }

    fn request() -> OriginRequest {
        OriginRequest {
            method: axum::http::Method::GET,
            uri: "/".to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            max_response_bytes: 1024,
        }
    }

    impl OriginConnection for Fake {
        fn send(&mut self, _request: OriginRequest) -> BoxFuture<'_, Result<OriginResponse, GatewayError>> {
            Box::pin(async {
                Ok(OriginResponse {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body: Bytes::new(),
                })
            })
        }

        fn is_reusable(&self) -> bool {
            self.reusable
        }
    }

    fn server() -> Arc<OriginServer> {
        Arc::new(OriginServer::new("127.0.0.1:9000".parse().unwrap(), 4))
    }

    #[test]
    fn test_release_returns_to_pool_once() {
        let server = server();
        let slot = server.try_acquire().unwrap();
        let conn = PooledConnection::new(Box::new(Fake { reusable: true }), slot, false);
        assert_eq!(server.active_connections(), 1);
        drop(conn);
        assert_eq!(server.active_connections(), 0);
        assert_eq!(server.idle_connections(), 1);
        assert!(server.pool.take().is_some());
        assert!(server.pool.take().is_none());
    }

    #[test]
    fn test_discarded_connection_is_closed() {
        let server = server();
        let slot = server.try_acquire().unwrap();
        let mut conn = PooledConnection::new(Box::new(Fake { reusable: true }), slot, false);
        conn.discard();
        drop(conn);
        assert_eq!(server.active_connections(), 0);
        assert_eq!(server.idle_connections(), 0);
    }

    #[test]
    fn test_take_skips_dead_connections() {
        let server = server();
        let slot = server.try_acquire().unwrap();
        drop(PooledConnection::new(Box::new(Fake { reusable: true }), slot, false));
        let pool = &server.pool;
        pool.give_back(Box::new(Fake { reusable: false }));
        assert_eq!(pool.idle_count(), 2);
        assert!(pool.take().is_some());
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_send_closes_connection() {
        let server = server();
        let slot = server.try_acquire().unwrap();
        let mut conn = PooledConnection::new(Box::new(Stalled), slot, false);
        let sent = tokio::time::timeout(std::time::Duration::from_millis(10), conn.send(request())).await;
        assert!(sent.is_err());
        drop(conn);
        assert_eq!(server.active_connections(), 0);
        assert_eq!(server.idle_connections(), 0);
    }

    #[tokio::test]
    async fn test_completed_send_is_pooled() {
        let server = server();
        let slot = server.try_acquire().unwrap();
        let mut conn = PooledConnection::new(Box::new(Fake { reusable: true }), slot, false);
        conn.send(request()).await.unwrap();
        drop(conn);
        assert_eq!(server.idle_connections(), 1);
    }
}
