use ingress_controller_core::{BackendPort, RouteRule, Scheme};
use ingress_controller_k8s_api as k8s;

/// Extracts one [`RouteRule`] per (rule, path) entry, in declaration order.
///
/// Paths whose backend is not a service, or whose service port is not set,
/// are skipped.
pub fn route_rules(spec: &k8s::IngressSpec) -> Vec<RouteRule> {
    let mut rules = Vec::new();
    for rule in spec.rules.iter().flatten() {
        let Some(http) = rule.http.as_ref() else {
            tracing::debug!(host = ?rule.host, "rule has no http paths");
            continue;
        };
        let scheme = scheme(rule.host.as_deref(), spec.tls.as_deref());

        for path in &http.paths {
            let Some(backend) = path.backend.service.as_ref() else {
                tracing::debug!(path = ?path.path, "ignoring non-service backend");
                continue;
            };
            let Some(port) = backend.port.as_ref().and_then(backend_port) else {
                tracing::warn!(service = %backend.name, path = ?path.path, "invalid service port");
                continue;
            };
            rules.push(RouteRule {
                host: rule.host.clone(),
                path: path.path.clone().unwrap_or_else(|| "/".to_string()),
                service: backend.name.clone(),
                port,
                scheme,
            });
        }
    }
    rules
}

/// Returns true if the ingress names a default backend and no rules.
pub fn is_default_backend_only(spec: &k8s::IngressSpec) -> bool {
    spec.default_backend.is_some() && spec.rules.as_ref().map_or(true, Vec::is_empty)
}

fn backend_port(port: &k8s::ServiceBackendPort) -> Option<BackendPort> {
    match (port.number, port.name.as_ref()) {
        (Some(number), _) => u16::try_from(number).ok().map(BackendPort::Number),
        (None, Some(name)) if !name.is_empty() => Some(BackendPort::Name(name.clone())),
        _ => None,
    }
}

/// A host is served over TLS when a TLS entry lists it. Entries without hosts
/// apply to all hosts.
fn scheme(host: Option<&str>, tls: Option<&[k8s::IngressTLS]>) -> Scheme {
    let covered = tls.into_iter().flatten().any(|tls| match tls.hosts.as_deref() {
        None | Some([]) => true,
        Some(hosts) => host.is_some_and(|host| hosts.iter().any(|h| h == host)),
    });
    if covered {
        Scheme::Https
    } else {
        Scheme::Http
    }
}
