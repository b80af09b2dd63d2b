//! Server selection subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyEndpoint attempt → Origin::choose_server
//!     → Apply selection algorithm:
//!         - round_robin.rs (rotate through servers)
//!         - least_conn.rs (pick server with fewest connections in use)
//!     → Origin::connect (acquire pooled connection)
//! ```
//!
//! # Design Decisions
//! - Selectors are stateless apart from a rotation counter
//! - Algorithm selection per origin
//! - Unavailable (ejected) servers excluded from selection

pub mod least_conn;
pub mod round_robin;

use std::sync::Arc;

use crate::config::LoadBalancerKind;
use crate::origin::server::OriginServer;

pub use least_conn::LeastConnections;
pub use round_robin::RoundRobin;

/// Picks the server for the next attempt.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    fn next_server(&self, servers: &[Arc<OriginServer>]) -> Option<Arc<OriginServer>>;
}

pub fn for_kind(kind: LoadBalancerKind) -> Box<dyn LoadBalancer> {
    match kind {
        LoadBalancerKind::RoundRobin => Box::new(RoundRobin::new()),
        LoadBalancerKind::LeastConnections => Box::new(LeastConnections::new()),
    }
}
