use crate::{BackendPort, ServiceAddresses};
use anyhow::Result;

/// A port exposed by a service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServicePort {
    pub name: Option<String>,
    pub port: u16,

    /// The port on the backing pods. Unset means the same as `port`.
    pub target_port: Option<BackendPort>,
}

/// The result of an authoritative point lookup against the control plane.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendLookup {
    /// Addresses for every service in the namespace, as currently advertised.
    pub endpoints: ServiceAddresses,

    /// The ports of the looked-up service, or `None` if the service does not
    /// exist.
    pub service: Option<Vec<ServicePort>>,
}

/// Models an out-of-band lookup of a backend service, used when the
/// membership cache has not yet observed it.
#[async_trait::async_trait]
pub trait DiscoverBackend: Send + Sync {
    async fn lookup(&self, namespace: &str, service: &str) -> Result<BackendLookup>;
}
