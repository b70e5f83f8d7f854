use crate::{membership::SharedCache, rules, service};
use ingress_controller_core::{
    BackendPort, DiscoverBackend, IpMapping, RouteRule, RoutingConfiguration, ServiceAddresses,
};
use ingress_controller_k8s_api::{self as k8s, ResourceExt};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("service {service} has no endpoints")]
    BackendUnresolved { service: String },

    #[error("service {service} does not expose port {port}")]
    PortUnresolved { service: String, port: BackendPort },

    #[error("failed to look up service {service}: {source}")]
    Lookup {
        service: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Translates ingress rules into IP mappings.
///
/// Addresses come from the shared membership cache when it knows the
/// service. Otherwise the backend is looked up directly and the result is
/// folded back into the cache.
///
/// Only a lookup sees the service's ports, so only the cold path maps the
/// declared port to a target port. Cache hits use the declared port.
#[derive(Debug)]
pub struct Resolver<D> {
    namespace: String,
    cache: SharedCache,
    discover: D,
}

// === impl Resolver ===

impl<D: DiscoverBackend> Resolver<D> {
    pub fn new(namespace: impl ToString, cache: SharedCache, discover: D) -> Self {
        Self {
            namespace: namespace.to_string(),
            cache,
            discover,
        }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Builds the routing configuration for an ingress.
    ///
    /// Rules that cannot be resolved are logged and left out; they never fail
    /// the ingress as a whole.
    pub async fn resolve(&self, ingress: &k8s::Ingress) -> RoutingConfiguration {
        let name = ingress.name_unchecked();
        let mut config = RoutingConfiguration::default();
        for rule in route_rules(ingress) {
            match self.resolve_rule(&rule).await {
                Ok(Some(mapping)) => config.ip_mappings.push(mapping),
                Ok(None) => {
                    tracing::debug!(service = %rule.service, path = %rule.path, "no ready addresses");
                }
                Err(error) => {
                    tracing::warn!(ingress = %name, path = %rule.path, %error, "skipping rule");
                }
            }
        }
        config
    }

    /// Builds the routing configuration for an ingress from the membership
    /// cache alone.
    ///
    /// Services the cache does not know are left out without a lookup.
    pub fn resolve_cached(&self, ingress: &k8s::Ingress) -> RoutingConfiguration {
        let snapshot = self.cache.snapshot();
        let mut config = RoutingConfiguration::default();
        for rule in route_rules(ingress) {
            let Some(addrs) = snapshot.get(&rule.service) else {
                tracing::debug!(service = %rule.service, path = %rule.path, "not in membership cache");
                continue;
            };
            match IpMapping::new(&rule, addrs.clone(), rule.port.clone()) {
                Some(mapping) => config.ip_mappings.push(mapping),
                None => {
                    tracing::debug!(service = %rule.service, path = %rule.path, "no ready addresses");
                }
            }
        }
        config
    }

    /// Resolves a single rule. Returns `Ok(None)` when the service is known
    /// but has no addresses.
    pub async fn resolve_rule(&self, rule: &RouteRule) -> Result<Option<IpMapping>, ResolveError> {
        let snapshot = self.cache.snapshot();
        if let Some(addrs) = snapshot.get(&rule.service) {
            return Ok(IpMapping::new(rule, addrs.clone(), rule.port.clone()));
        }
        drop(snapshot);

        tracing::debug!(service = %rule.service, "cache miss");
        let lookup = self
            .discover
            .lookup(&self.namespace, &rule.service)
            .await
            .map_err(|source| ResolveError::Lookup {
                service: rule.service.clone(),
                source,
            })?;

        let Some(ports) = lookup.service else {
            if !lookup.endpoints.contains_key(&rule.service) {
                return Err(ResolveError::BackendUnresolved {
                    service: rule.service.clone(),
                });
            }
            // Endpoints exist without a service; use the declared port.
            let addrs = lookup.endpoints.get(&rule.service).cloned().unwrap_or_default();
            self.refresh(lookup.endpoints);
            return Ok(IpMapping::new(rule, addrs, rule.port.clone()));
        };

        let port = service::resolve_target_port(&ports, &rule.port);

        let mut endpoints = lookup.endpoints;
        let addrs = endpoints.entry(rule.service.clone()).or_default().clone();
        self.refresh(endpoints);

        let port = port.ok_or_else(|| ResolveError::PortUnresolved {
            service: rule.service.clone(),
            port: rule.port.clone(),
        })?;
        Ok(IpMapping::new(rule, addrs, port))
    }

    fn refresh(&self, endpoints: ServiceAddresses) {
        if self.cache.replace(endpoints) {
            tracing::debug!(services = self.cache.len(), "refreshed membership from lookup");
        }
    }
}

/// Extracts the rules to resolve, or none when the ingress has no spec or only
/// a default backend.
fn route_rules(ingress: &k8s::Ingress) -> Vec<RouteRule> {
    let Some(spec) = ingress.spec.as_ref() else {
        tracing::debug!(ingress = %ingress.name_unchecked(), "ingress has no spec");
        return Vec::new();
    };
    if rules::is_default_backend_only(spec) {
        tracing::warn!(ingress = %ingress.name_unchecked(), "default backends are not supported");
        return Vec::new();
    }
    rules::route_rules(spec)
}
