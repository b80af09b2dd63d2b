//! Least-connections server selection.

use std::sync::Arc;

use crate::load_balancer::LoadBalancer;
use crate::origin::server::OriginServer;

/// Least connections selector.
/// Selects the available server with the fewest connections in use.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_server(&self, servers: &[Arc<OriginServer>]) -> Option<Arc<OriginServer>> {
        // In case of tie, the first one is selected (stability)
        servers
            .iter()
            .filter(|s| s.is_available())
            .min_by_key(|s| s.active_connections())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_conn() {
        let lb = LeastConnections::new();
        let s1 = Arc::new(OriginServer::new("127.0.0.1:8080".parse().unwrap(), 100));
        let s2 = Arc::new(OriginServer::new("127.0.0.1:8081".parse().unwrap(), 100));
        let servers = vec![s1.clone(), s2.clone()];

        let _busy = s1.try_acquire().unwrap();
        assert_eq!(lb.next_server(&servers).unwrap().addr, s2.addr);

        let _b1 = s2.try_acquire().unwrap();
        let _b2 = s2.try_acquire().unwrap();
        assert_eq!(lb.next_server(&servers).unwrap().addr, s1.addr);
    }
}
