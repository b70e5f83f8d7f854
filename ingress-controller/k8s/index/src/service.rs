use ingress_controller_core::{BackendPort, ServicePort};
use ingress_controller_k8s_api::{self as k8s, IntOrString};

/// Returns the ports exposed by a service.
pub fn ports(service: &k8s::Service) -> Vec<ServicePort> {
    service
        .spec
        .iter()
        .flat_map(|spec| spec.ports.iter().flatten())
        .filter_map(|port| {
            let Ok(number) = u16::try_from(port.port) else {
                tracing::warn!(port = port.port, "invalid service port");
                return None;
            };
            Some(ServicePort {
                name: port.name.clone(),
                port: number,
                target_port: port.target_port.as_ref().and_then(target_port),
            })
        })
        .collect()
}

fn target_port(port: &IntOrString) -> Option<BackendPort> {
    match port {
        IntOrString::Int(n) => u16::try_from(*n)
            .ok()
            .filter(|n| *n != 0)
            .map(BackendPort::Number),
        IntOrString::String(name) if !name.is_empty() => Some(BackendPort::Name(name.clone())),
        IntOrString::String(_) => None,
    }
}

/// Finds the service port matching a declared ingress backend port and
/// returns the port traffic should be sent to on the backing pods.
pub fn resolve_target_port(ports: &[ServicePort], declared: &BackendPort) -> Option<BackendPort> {
    let port = ports.iter().find(|p| match declared {
        BackendPort::Number(n) => p.port == *n,
        BackendPort::Name(name) => p.name.as_deref() == Some(name.as_str()),
    })?;
    Some(
        port.target_port
            .clone()
            .unwrap_or(BackendPort::Number(port.port)),
    )
}
