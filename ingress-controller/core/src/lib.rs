#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod discover;
pub mod routes;

pub use self::{
    discover::{BackendLookup, DiscoverBackend, ServicePort},
    routes::{BackendPort, IpMapping, RouteRule, RoutingConfiguration, Scheme},
};

/// Maps a service name to the addresses currently backing it, in the order the
/// control plane advertised them.
pub type ServiceAddresses = ahash::AHashMap<String, Vec<String>>;
