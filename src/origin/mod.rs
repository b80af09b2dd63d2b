//! Origin connection management.
//!
//! # Data Flow
//! ```text
//! ProxyEndpoint
//!     → OriginManager::get(route VIP)
//!     → Origin::pre_request_checks (in-flight ceiling, InFlightGuard)
//!     → per attempt:
//!         Origin::choose_server (load_balancer)
//!         → Origin::connect (slot + pooled or new connection)
//!         → PooledConnection::send
//!     → Origin::record_final_response / record_final_error
//! ```
//!
//! # Design Decisions
//! - Settings live in an `ArcSwap` and are re-read on every request
//! - Reloads update origins in place; counters and pools survive
//! - Every acquisition is an RAII guard, released exactly once on any exit path

pub mod attempt;
pub mod connector;
pub mod pool;
pub mod server;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::http::StatusCode;
use dashmap::DashMap;
use serde::Serialize;

use crate::config::OriginConfig;
use crate::context::{ContextKey, PassportState, SessionContext};
use crate::errors::{GatewayError, StatusCategory};
use crate::load_balancer::{self, LoadBalancer};
use crate::observability::metrics;

pub use attempt::RequestAttempt;
pub use connector::{HttpOriginConnector, OriginConnection, OriginConnector, OriginRequest, OriginResponse};
pub use pool::{ConnectionPool, PooledConnection};
pub use server::{HealthState, OriginServer, ServerConnectionGuard};

/// Per-request override of an origin's retry ceiling, set by filters that
/// know a request must not be replayed (or may be replayed more).
pub static MAX_RETRIES_OVERRIDE: LazyLock<ContextKey<u32>> =
    LazyLock::new(|| ContextKey::new("origin.max_retries"));

/// Outcome counters of an origin.
#[derive(Debug, Default)]
pub struct OriginStats {
    pub final_responses: AtomicU64,
    pub final_errors: AtomicU64,
    pub concurrency_rejections: AtomicU64,
}

/// A named group of servers with shared limits and settings.
pub struct Origin {
    name: String,
    settings: ArcSwap<OriginConfig>,
    servers: ArcSwap<Vec<Arc<OriginServer>>>,
    selector: ArcSwap<Box<dyn LoadBalancer>>,
    connector: Arc<dyn OriginConnector>,
    in_flight: AtomicUsize,
    stats: OriginStats,
}

impl Origin {
    pub fn new(config: OriginConfig, connector: Arc<dyn OriginConnector>) -> Self {
        let origin = Self {
            name: config.name.clone(),
            settings: ArcSwap::from_pointee(config.clone()),
            servers: ArcSwap::from_pointee(Vec::new()),
            selector: ArcSwap::from_pointee(load_balancer::for_kind(config.load_balancer)),
            connector,
            in_flight: AtomicUsize::new(0),
            stats: OriginStats::default(),
        };
        origin.apply_config(config);
        origin
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> Arc<OriginConfig> {
        self.settings.load_full()
    }

    pub fn servers(&self) -> Arc<Vec<Arc<OriginServer>>> {
        self.servers.load_full()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &OriginStats {
        &self.stats
    }

    /// Install new settings. Servers that keep their address keep their
    /// counters and idle connections.
    pub fn apply_config(&self, config: OriginConfig) {
        let current = self.servers.load_full();
        let cooldown = Duration::from_millis(config.ejection_cooldown_ms);
        let mut servers = Vec::with_capacity(config.servers.len());
        for address in &config.servers {
            let addr: SocketAddr = match address.parse() {
                Ok(a) => a,
                Err(_) => {
                    tracing::warn!(origin = %self.name, address = %address, "Invalid origin server address");
                    continue;
                }
            };
            let server = current
                .iter()
                .find(|s| s.addr == addr)
                .cloned()
                .unwrap_or_else(|| Arc::new(OriginServer::new(addr, config.max_connections_per_server)));
            server.set_limits(config.max_connections_per_server, cooldown);
            servers.push(server);
        }
        for removed in current.iter().filter(|s| !servers.iter().any(|n| n.addr == s.addr)) {
            removed.pool.clear();
        }

        if self.settings.load().load_balancer != config.load_balancer {
            self.selector.store(Arc::new(load_balancer::for_kind(config.load_balancer)));
        }
        self.servers.store(Arc::new(servers));
        self.settings.store(Arc::new(config));
    }

    /// Admit a request if the origin is below its in-flight ceiling.
    pub fn pre_request_checks(self: &Arc<Self>, ctx: &mut SessionContext) -> Result<InFlightGuard, GatewayError> {
        let limit = self.settings.load().max_concurrent_requests;
        let mut prev = self.in_flight.load(Ordering::Acquire);
        loop {
            if prev >= limit {
                self.stats.concurrency_rejections.fetch_add(1, Ordering::Relaxed);
                ctx.mark(PassportState::OriginConcurrencyRejected);
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    origin = %self.name,
                    in_flight = prev,
                    limit,
                    "Origin concurrency exceeded"
                );
                return Err(GatewayError::OriginConcurrencyExceeded {
                    origin: self.name.clone(),
                    in_flight: prev,
                    limit,
                });
            }
            match self.in_flight.compare_exchange_weak(prev, prev + 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        metrics::record_origin_in_flight(&self.name, prev + 1);
        Ok(InFlightGuard { origin: self.clone() })
    }

    fn record_proxy_request_end(&self) {
        let now = self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::record_origin_in_flight(&self.name, now);
    }

    /// Next server to try, or `None` if every server is ejected.
    pub fn choose_server(&self) -> Option<Arc<OriginServer>> {
        let servers = self.servers.load();
        self.selector.load().next_server(&servers)
    }

    /// Retry ceiling for this request: the context override, else the
    /// origin's setting.
    pub fn max_retries_for_request(&self, ctx: &SessionContext) -> u32 {
        ctx.get(&MAX_RETRIES_OVERRIDE)
            .copied()
            .unwrap_or_else(|| self.settings.load().max_retries)
    }

    /// Check out a connection to `server`: an idle pooled one if available,
    /// otherwise a new one.
    pub async fn connect(
        &self,
        server: &Arc<OriginServer>,
        attempt: u32,
        ctx: &mut SessionContext,
    ) -> Result<PooledConnection, GatewayError> {
        ctx.mark(PassportState::OriginConnAcquireStart);

        let Some(slot) = server.try_acquire() else {
            ctx.mark(PassportState::OriginConnAcquireFailed);
            return Err(GatewayError::OriginServerMaxConnections {
                server: server.addr.to_string(),
                limit: server.max_connections(),
            });
        };

        if let Some(conn) = server.pool.take() {
            ctx.mark(PassportState::OriginConnAcquireEnd);
            tracing::trace!(request_id = %ctx.request_id(), server = %server.addr, attempt, "Reusing pooled connection");
            return Ok(PooledConnection::new(conn, slot, true));
        }

        let timeout = Duration::from_millis(self.settings.load().connect_timeout_ms);
        match self.connector.connect(server, timeout).await {
            Ok(conn) => {
                ctx.mark(PassportState::OriginConnAcquireEnd);
                Ok(PooledConnection::new(conn, slot, false))
            }
            Err(e) => {
                ctx.mark(PassportState::OriginConnAcquireFailed);
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    server = %server.addr,
                    attempt,
                    error = %e,
                    "Origin connect failed"
                );
                Err(e)
            }
        }
    }

    pub fn record_final_response(&self, ctx: &mut SessionContext, status: StatusCode) {
        self.stats.final_responses.fetch_add(1, Ordering::Relaxed);
        let category = StatusCategory::from_origin_status(status);
        ctx.set_status_category(category);
        metrics::record_origin_outcome(&self.name, category.as_str());
    }

    pub fn record_final_error(&self, ctx: &mut SessionContext, err: &GatewayError) {
        self.stats.final_errors.fetch_add(1, Ordering::Relaxed);
        let category = err.status_category();
        ctx.set_status_category(category);
        metrics::record_origin_outcome(&self.name, category.as_str());
    }

    pub fn status(&self) -> OriginStatus {
        let settings = self.settings.load();
        OriginStatus {
            name: self.name.clone(),
            in_flight: self.in_flight(),
            max_concurrent_requests: settings.max_concurrent_requests,
            final_responses: self.stats.final_responses.load(Ordering::Relaxed),
            final_errors: self.stats.final_errors.load(Ordering::Relaxed),
            concurrency_rejections: self.stats.concurrency_rejections.load(Ordering::Relaxed),
            servers: self
                .servers
                .load()
                .iter()
                .map(|s| ServerStatus {
                    address: s.addr.to_string(),
                    health: s.health(),
                    active_connections: s.active_connections(),
                    idle_connections: s.idle_connections(),
                    max_connections: s.max_connections(),
                    total_requests: s.total_requests(),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Origin")
            .field("name", &self.name)
            .field("in_flight", &self.in_flight())
            .field("servers", &self.servers.load().len())
            .finish()
    }
}

/// Holds one in-flight slot of an origin until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    origin: Arc<Origin>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.origin.record_proxy_request_end();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub address: String,
    pub health: HealthState,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub max_connections: usize,
    pub total_requests: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OriginStatus {
    pub name: String,
    pub in_flight: usize,
    pub max_concurrent_requests: usize,
    pub final_responses: u64,
    pub final_errors: u64,
    pub concurrency_rejections: u64,
    pub servers: Vec<ServerStatus>,
}

/// All configured origins, by name.
pub struct OriginManager {
    origins: DashMap<String, Arc<Origin>>,
    connector: Arc<dyn OriginConnector>,
}

impl OriginManager {
    pub fn new(configs: &[OriginConfig], connector: Arc<dyn OriginConnector>) -> Self {
        let manager = Self {
            origins: DashMap::new(),
            connector,
        };
        manager.apply_config(configs);
        manager
    }

    pub fn get(&self, name: &str) -> Option<Arc<Origin>> {
        self.origins.get(name).map(|o| o.value().clone())
    }

    /// Sync origins with a new configuration: update existing ones in place,
    /// add new ones, drop removed ones.
    pub fn apply_config(&self, configs: &[OriginConfig]) {
        let wanted: HashMap<&str, &OriginConfig> = configs.iter().map(|c| (c.name.as_str(), c)).collect();

        self.origins.retain(|name, _| {
            let keep = wanted.contains_key(name.as_str());
            if !keep {
                tracing::info!(origin = %name, "Origin removed");
            }
            keep
        });

        for (name, config) in wanted {
            match self.get(name) {
                Some(origin) => origin.apply_config(config.clone()),
                None => {
                    tracing::info!(origin = %name, servers = config.servers.len(), "Origin added");
                    self.origins.insert(
                        name.to_string(),
                        Arc::new(Origin::new(config.clone(), self.connector.clone())),
                    );
                }
            }
        }
    }

    pub fn all(&self) -> Vec<Arc<Origin>> {
        let mut origins: Vec<_> = self.origins.iter().map(|o| o.value().clone()).collect();
        origins.sort_by(|a, b| a.name().cmp(b.name()));
        origins
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

impl std::fmt::Debug for OriginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginManager")
            .field("origins", &self.origins.len())
            .finish()
    }
}
