use ingress_controller_core::ServiceAddresses;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

pub type SharedCache = Arc<MembershipCache>;

/// Holds the most recent snapshot of service membership.
///
/// Snapshots are immutable. Writers build a complete mapping and swap it in;
/// readers clone the current `Arc` and never hold the lock while using it.
#[derive(Debug)]
pub struct MembershipCache {
    current: RwLock<Arc<ServiceAddresses>>,

    /// Incremented each time a new snapshot is installed.
    generation: watch::Sender<u64>,
}

// === impl MembershipCache ===

impl Default for MembershipCache {
    fn default() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            current: RwLock::new(Arc::default()),
            generation,
        }
    }
}

impl MembershipCache {
    pub fn shared() -> SharedCache {
        Arc::new(Self::default())
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<ServiceAddresses> {
        self.current.read().clone()
    }

    /// Atomically replaces the whole snapshot.
    ///
    /// Returns false, without notifying subscribers, if `addresses` is equal to
    /// the current snapshot.
    pub fn replace(&self, addresses: ServiceAddresses) -> bool {
        {
            let mut current = self.current.write();
            if **current == addresses {
                return false;
            }
            *current = Arc::new(addresses);
        }
        self.generation.send_modify(|generation| *generation += 1);
        true
    }

    /// Returns a receiver that is notified each time a new snapshot is
    /// installed.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Returns the number of services in the current snapshot.
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(entries: &[(&str, &[&str])]) -> ServiceAddresses {
        entries
            .iter()
            .map(|(svc, ips)| {
                (
                    svc.to_string(),
                    ips.iter().map(|ip| ip.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn snapshots_are_not_affected_by_later_replacements() {
        let cache = MembershipCache::shared();
        assert!(cache.replace(addrs(&[("web", &["10.0.0.5"])])));
        let before = cache.snapshot();

        assert!(cache.replace(addrs(&[("api", &["10.0.0.7"])])));
        let after = cache.snapshot();

        assert_eq!(*before, addrs(&[("web", &["10.0.0.5"])]));
        assert_eq!(*after, addrs(&[("api", &["10.0.0.7"])]));
        assert_eq!(cache.generation(), 2);
    }

    #[test]
    fn unchanged_replacements_do_not_notify() {
        let cache = MembershipCache::shared();
        let mut rx = cache.subscribe();

        assert!(cache.replace(addrs(&[("web", &["10.0.0.5"])])));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!cache.replace(addrs(&[("web", &["10.0.0.5"])])));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(cache.generation(), 1);
    }

    #[tokio::test]
    async fn concurrent_readers_observe_whole_snapshots() {
        let cache = MembershipCache::shared();
        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..100u8 {
                    let ip = format!("10.0.0.{i}");
                    cache.replace(addrs(&[("web", &[ip.as_str()]), ("api", &[ip.as_str()])]));
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..100 {
            let snapshot = cache.snapshot();
            // Both services are always written together.
            assert_eq!(snapshot.get("web"), snapshot.get("api"));
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }
}
