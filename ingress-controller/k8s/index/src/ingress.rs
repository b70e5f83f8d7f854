use ahash::AHashMap as HashMap;
use ingress_controller_k8s_api::{self as k8s, ResourceExt};
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, sync::Arc};
use tokio::sync::mpsc::UnboundedSender;

pub type SharedIndex = Arc<RwLock<Index>>;

/// An ingress state change, classified against the ingresses previously
/// observed.
#[derive(Clone, Debug, PartialEq)]
pub enum IngressEvent {
    Added(k8s::Ingress),
    Modified(k8s::Ingress),
    Deleted { name: String },
}

/// Tracks the ingresses in a namespace and queues a classified event for each
/// meaningful change. Resolution and publishing happen on the receiving end of
/// the queue, not in the watch.
#[derive(Debug)]
pub struct Index {
    namespace: String,

    /// The last observed spec of each known ingress.
    ingresses: HashMap<String, Option<k8s::IngressSpec>>,

    updates: UnboundedSender<IngressEvent>,
}

// === impl IngressEvent ===

impl IngressEvent {
    pub fn name(&self) -> String {
        match self {
            Self::Added(ingress) | Self::Modified(ingress) => ingress.name_unchecked(),
            Self::Deleted { name } => name.clone(),
        }
    }
}

// === impl Index ===

impl Index {
    pub fn shared(namespace: impl ToString, updates: UnboundedSender<IngressEvent>) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            namespace: namespace.to_string(),
            ingresses: HashMap::default(),
            updates,
        }))
    }

    fn send(&self, event: IngressEvent) {
        if let Err(error) = self.updates.send(event) {
            tracing::error!(ingress = %error.0.name(), "Failed to queue ingress event");
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Ingress> for Index {
    fn apply(&mut self, ingress: k8s::Ingress) {
        let namespace = ingress.namespace();
        if namespace.as_deref() != Some(self.namespace.as_str()) {
            tracing::debug!(?namespace, "ignoring ingress in another namespace");
            return;
        }

        let name = ingress.name_unchecked();
        let event = match self.ingresses.entry(name) {
            Entry::Vacant(entry) => {
                tracing::debug!(ingress = %entry.key(), "added");
                entry.insert(ingress.spec.clone());
                IngressEvent::Added(ingress)
            }
            Entry::Occupied(mut entry) => {
                // Re-lists deliver every ingress again; only changed specs matter.
                if *entry.get() == ingress.spec {
                    tracing::debug!(ingress = %entry.key(), "no changes");
                    return;
                }
                tracing::debug!(ingress = %entry.key(), "modified");
                entry.insert(ingress.spec.clone());
                IngressEvent::Modified(ingress)
            }
        };
        self.send(event);
    }

    fn delete(&mut self, namespace: String, name: String) {
        if namespace != self.namespace {
            return;
        }
        if self.ingresses.remove(&name).is_some() {
            tracing::debug!(ingress = %name, "deleted");
            self.send(IngressEvent::Deleted { name });
        }
    }
}
