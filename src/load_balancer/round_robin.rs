//! Round-robin server selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::LoadBalancer;
use crate::origin::server::OriginServer;

/// Round-robin selector.
/// Stores an internal counter to rotate through servers.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, servers: &[Arc<OriginServer>]) -> Option<Arc<OriginServer>> {
        if servers.is_empty() {
            return None;
        }

        // Bounded scan so an origin with only ejected servers cannot spin.
        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = servers.len();

        (0..len)
            .map(|i| &servers[(start + i) % len])
            .find(|s| s.is_available())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn server(port: u16) -> Arc<OriginServer> {
        Arc::new(OriginServer::new(format!("127.0.0.1:{port}").parse().unwrap(), 100))
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let s1 = server(8080);
        let s2 = server(8081);
        let servers = vec![s1.clone(), s2.clone()];

        assert_eq!(lb.next_server(&servers).unwrap().addr, s1.addr);
        assert_eq!(lb.next_server(&servers).unwrap().addr, s2.addr);
        assert_eq!(lb.next_server(&servers).unwrap().addr, s1.addr);
    }

    #[test]
    fn test_skips_ejected_servers() {
        let lb = RoundRobin::new();
        let s1 = server(8080);
        let s2 = server(8081);
        s1.set_limits(100, Duration::from_secs(60));
        s1.mark_failure(1);
        let servers = vec![s1, s2.clone()];

        for _ in 0..3 {
            assert_eq!(lb.next_server(&servers).unwrap().addr, s2.addr);
        }
    }

    #[test]
    fn test_empty() {
        assert!(RoundRobin::new().next_server(&[]).is_none());
    }
}
