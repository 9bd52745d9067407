use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;

use minirpc_common::{Result, RpcError};

/// Picks one endpoint per outbound call from a live set.
///
/// Implementations are shared between resolver callbacks (which mutate the
/// set) and any number of concurrent callers (which pick from it).
pub trait Balancer: Send + Sync {
    /// Inserts an endpoint
    fn add(&self, endpoint: &str);

    /// Removes the first entry equal to `endpoint`
    fn del(&self, endpoint: &str);

    /// Picks one live endpoint
    fn pick(&self) -> Result<String>;

    /// Number of live entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Random load balancer
///
/// Every pick is an independent uniform choice, so the same endpoint may come
/// back several times in a row. Duplicated endpoints are kept (one entry per
/// add), which weights them accordingly.
#[derive(Debug, Default)]
pub struct RandomBalancer {
    endpoints: Mutex<Vec<String>>,
}

impl RandomBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the live entries, in their current order
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().clone()
    }
}

impl Balancer for RandomBalancer {
    fn add(&self, endpoint: &str) {
        let mut endpoints = self.endpoints.lock();
        endpoints.push(endpoint.to_string());
        endpoints.shuffle(&mut rand::rng());
    }

    fn del(&self, endpoint: &str) {
        let mut endpoints = self.endpoints.lock();
        if let Some(pos) = endpoints.iter().position(|e| e == endpoint) {
            endpoints.remove(pos);
            endpoints.shuffle(&mut rand::rng());
        }
    }

    fn pick(&self) -> Result<String> {
        let endpoints = self.endpoints.lock();
        if endpoints.is_empty() {
            return Err(RpcError::NoEndpoint);
        }
        let idx = rand::rng().random_range(0..endpoints.len());
        Ok(endpoints[idx].clone())
    }

    fn len(&self) -> usize {
        self.endpoints.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_empty_balancer_has_no_endpoint() {
        let lb = RandomBalancer::new();
        assert!(lb.is_empty());
        assert!(matches!(lb.pick(), Err(RpcError::NoEndpoint)));
    }

    #[test]
    fn test_single_endpoint() {
        let lb = RandomBalancer::new();
        lb.add("127.0.0.1:9001");
        for _ in 0..100 {
            assert_eq!(lb.pick().unwrap(), "127.0.0.1:9001");
        }
    }

    #[test]
    fn test_pick_stays_in_live_set() {
        let lb = RandomBalancer::new();
        let mut live: Vec<String> = Vec::new();

        // deterministic add/del sequence
        for i in 0..50 {
            let ep = format!("10.0.0.{}:80", i % 7);
            if i % 3 == 2 {
                lb.del(&ep);
                if let Some(pos) = live.iter().position(|e| *e == ep) {
                    live.remove(pos);
                }
            } else {
                lb.add(&ep);
                live.push(ep);
            }

            assert_eq!(lb.len(), live.len());
            match lb.pick() {
                Ok(picked) => assert!(live.contains(&picked), "{} not live", picked),
                Err(RpcError::NoEndpoint) => assert!(live.is_empty()),
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    }

    #[test]
    fn test_del_removes_first_match_only() {
        let lb = RandomBalancer::new();
        lb.add("a:1");
        lb.add("a:1");
        lb.add("b:1");

        lb.del("a:1");
        let mut left = lb.endpoints();
        left.sort();
        assert_eq!(left, vec!["a:1".to_string(), "b:1".to_string()]);

        lb.del("missing:1");
        assert_eq!(lb.len(), 2);
    }

    #[test]
    fn test_pick_reaches_every_endpoint() {
        let lb = RandomBalancer::new();
        for ep in ["a:1", "b:1", "c:1"] {
            lb.add(ep);
        }
        let seen: HashSet<String> = (0..500).map(|_| lb.pick().unwrap()).collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_concurrent_add_del_pick() {
        let lb = Arc::new(RandomBalancer::new());
        lb.add("stable:1");

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let lb = lb.clone();
                std::thread::spawn(move || {
                    let ep = format!("worker{}:1", t);
                    for _ in 0..200 {
                        lb.add(&ep);
                        assert!(lb.pick().is_ok());
                        lb.del(&ep);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(lb.endpoints(), vec!["stable:1".to_string()]);
    }
}
