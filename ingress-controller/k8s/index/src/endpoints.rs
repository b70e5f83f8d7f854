//! Maintains service membership from `Endpoints` resources.
//!
//! Each `Endpoints` resource carries the complete address list for its
//! service, so every event simply replaces that service's entry. The full
//! mapping is then rebuilt and swapped into the [`MembershipCache`] so that
//! readers only ever observe whole snapshots.

use crate::membership::SharedCache;
use ahash::AHashMap as HashMap;
use ingress_controller_core::ServiceAddresses;
use ingress_controller_k8s_api::{self as k8s, ResourceExt};
use parking_lot::RwLock;
use std::sync::Arc;

pub type SharedIndex = Arc<RwLock<Index>>;

#[derive(Debug)]
pub struct Index {
    namespace: String,

    /// Addresses by service name, as last observed.
    services: HashMap<String, Vec<String>>,

    cache: SharedCache,
}

// === impl Index ===

impl Index {
    pub fn shared(namespace: impl ToString, cache: SharedCache) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            namespace: namespace.to_string(),
            services: HashMap::default(),
            cache,
        }))
    }

    fn publish(&self) {
        let snapshot = self
            .services
            .iter()
            .map(|(svc, addrs)| (svc.clone(), addrs.clone()))
            .collect::<ServiceAddresses>();
        let services = snapshot.len();
        if self.cache.replace(snapshot) {
            tracing::debug!(services, "updated membership");
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Endpoints> for Index {
    fn apply(&mut self, endpoints: k8s::Endpoints) {
        let namespace = endpoints.namespace();
        if namespace.as_deref() != Some(self.namespace.as_str()) {
            tracing::debug!(?namespace, "ignoring endpoints in another namespace");
            return;
        }

        let name = endpoints.name_unchecked();
        let addrs = addresses(&endpoints);
        tracing::trace!(service = %name, ?addrs);
        self.services.insert(name, addrs);
        self.publish();
    }

    fn delete(&mut self, namespace: String, name: String) {
        if namespace != self.namespace {
            return;
        }
        if self.services.remove(&name).is_some() {
            tracing::debug!(service = %name, "removed endpoints");
            self.publish();
        }
    }
}

/// Returns the ready addresses of an `Endpoints` resource in the order they
/// are listed.
pub fn addresses(endpoints: &k8s::Endpoints) -> Vec<String> {
    endpoints
        .subsets
        .iter()
        .flatten()
        .flat_map(|subset| subset.addresses.iter().flatten())
        .map(|addr| addr.ip.clone())
        .collect()
}

/// Builds a membership snapshot from a full list of `Endpoints` resources.
pub fn snapshot<'a>(endpoints: impl IntoIterator<Item = &'a k8s::Endpoints>) -> ServiceAddresses {
    endpoints
        .into_iter()
        .map(|ep| (ep.name_unchecked(), addresses(ep)))
        .collect()
}
