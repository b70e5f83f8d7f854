use serde::{Deserialize, Serialize};
use std::fmt;

/// A backend port as declared by an ingress or resolved from a service.
///
/// Serialized untagged so that the routing artifact carries either a bare
/// number or a port name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackendPort {
    Number(u16),
    Name(String),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

/// One (path, service, port) tuple extracted from an ingress's rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteRule {
    /// The host the rule applies to. Unset rules match all hosts.
    pub host: Option<String>,
    pub path: String,
    pub service: String,
    pub port: BackendPort,
    pub scheme: Scheme,
}

/// A resolved route: the unit written into the routing artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpMapping {
    pub ip_addresses: Vec<String>,
    pub port: BackendPort,
    pub path: String,
    pub scheme: Scheme,
}

/// The full routing configuration handed to the data-plane process.
///
/// Every publish replaces the previous configuration wholesale.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfiguration {
    pub ip_mappings: Vec<IpMapping>,
}

// === impl BackendPort ===

impl From<u16> for BackendPort {
    fn from(port: u16) -> Self {
        Self::Number(port)
    }
}

impl fmt::Display for BackendPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(port) => write!(f, "{port}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

// === impl Scheme ===

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Https => f.write_str("https"),
        }
    }
}

// === impl IpMapping ===

impl IpMapping {
    /// Builds a mapping for `rule`, or returns `None` when there are no
    /// addresses to route to.
    pub fn new(rule: &RouteRule, ip_addresses: Vec<String>, port: BackendPort) -> Option<Self> {
        if ip_addresses.is_empty() {
            return None;
        }
        Some(Self {
            ip_addresses,
            port,
            path: rule.path.clone(),
            scheme: rule.scheme,
        })
    }
}

// === impl RoutingConfiguration ===

impl RoutingConfiguration {
    pub fn len(&self) -> usize {
        self.ip_mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ip_mappings.is_empty()
    }
}
