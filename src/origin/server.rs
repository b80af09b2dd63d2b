//! Origin server abstraction.
//!
//! # Responsibilities
//! - Represent a single server of an origin
//! - Track connections in use (for least-connections selection)
//! - Enforce the per-server connection limit
//! - Track passive health (Healthy/Unhealthy) from request outcomes

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::origin::pool::ConnectionPool;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// A single server of an origin.
#[derive(Debug)]
pub struct OriginServer {
    /// The address of the server.
    pub addr: SocketAddr,
    /// Maximum connections in use at once. Updated on config reload.
    max_connections: AtomicUsize,
    /// Number of connections currently checked out.
    active_connections: AtomicUsize,
    /// Total connections handed out.
    total_requests: AtomicU64,

    /// Current health state (0=Unknown, 1=Healthy, 2=Unhealthy).
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
    /// When the server was last marked unhealthy.
    ejected_at: Mutex<Option<Instant>>,
    ejection_cooldown_ms: AtomicU64,

    /// Idle keep-alive connections.
    pub(crate) pool: ConnectionPool,
}

impl OriginServer {
    pub fn new(addr: SocketAddr, max_connections: usize) -> Self {
        Self {
            addr,
            max_connections: AtomicUsize::new(max_connections),
            active_connections: AtomicUsize::new(0),
            total_requests: AtomicU64::new(0),
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
            ejected_at: Mutex::new(None),
            ejection_cooldown_ms: AtomicU64::new(10_000),
            pool: ConnectionPool::new(max_connections),
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections.load(Ordering::Relaxed)
    }

    pub fn set_limits(&self, max_connections: usize, ejection_cooldown: Duration) {
        self.max_connections.store(max_connections, Ordering::Relaxed);
        self.ejection_cooldown_ms
            .store(ejection_cooldown.as_millis() as u64, Ordering::Relaxed);
        self.pool.set_max_idle(max_connections);
    }

    /// Connections currently in use.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn idle_connections(&self) -> usize {
        self.pool.idle_count()
    }

    /// Reserve a connection slot. Returns `None` at the connection limit.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ServerConnectionGuard> {
        let max = self.max_connections();
        let mut prev = self.active_connections.load(Ordering::Relaxed);
        loop {
            if prev >= max {
                return None;
            }
            match self.active_connections.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        Some(ServerConnectionGuard {
            server: self.clone(),
        })
    }

    // --- Health Logic ---

    pub fn health(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Return true if server is considered healthy (Healthy or Unknown).
    pub fn is_healthy(&self) -> bool {
        self.health() != HealthState::Unhealthy
    }

    /// Healthy, or unhealthy for longer than the ejection cooldown.
    pub fn is_available(&self) -> bool {
        if self.is_healthy() {
            return true;
        }
        let cooldown = Duration::from_millis(self.ejection_cooldown_ms.load(Ordering::Relaxed));
        let ejected_at = self.ejected_at.lock().expect("server health mutex poisoned");
        ejected_at.map(|t| t.elapsed() >= cooldown).unwrap_or(true)
    }

    /// Report a successful request.
    pub fn mark_success(&self, healthy_threshold: usize) {
        self.consecutive_failures.store(0, Ordering::Relaxed);

        if self.health() == HealthState::Healthy {
            return;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            if self.health() == HealthState::Unhealthy {
                tracing::info!(server = %self.addr, "Origin server recovered");
            }
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
        }
    }

    /// Report a failed request.
    pub fn mark_failure(&self, unhealthy_threshold: usize) {
        self.consecutive_successes.store(0, Ordering::Relaxed);

        if self.health() == HealthState::Unhealthy {
            // Probe after cooldown failed; restart the cooldown.
            *self.ejected_at.lock().expect("server health mutex poisoned") = Some(Instant::now());
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            tracing::warn!(server = %self.addr, failures, "Origin server marked unhealthy");
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            *self.ejected_at.lock().expect("server health mutex poisoned") = Some(Instant::now());
        }
    }
}

/// A RAII guard that holds one connection slot of a server.
#[derive(Debug)]
pub struct ServerConnectionGuard {
    server: Arc<OriginServer>,
}

impl Deref for ServerConnectionGuard {
    type Target = OriginServer;
    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

impl ServerConnectionGuard {
    pub fn server(&self) -> &Arc<OriginServer> {
        &self.server
    }
}

impl Drop for ServerConnectionGuard {
    fn drop(&mut self) {
        self.server.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}
