//! Ingress controller indexes
//!
//! The controller watches two kinds of resources in a single namespace:
//!
//! - Each `Endpoints` resource lists the addresses currently backing a service. The endpoints
//!   index rebuilds the full service-to-addresses mapping on every change and swaps it into the
//!   shared [`MembershipCache`].
//! - Each `Ingress` describes routes from paths to services. The ingress index classifies every
//!   change as an add, modification, or deletion and queues it for reconciliation.
//!
//! ```text
//! [ Endpoints ] -> [ MembershipCache ] <- [ Resolver ] <- [ IngressEvent ] <- [ Ingress ]
//! ```
//!
//! The [`Resolver`] turns an ingress into a [`RoutingConfiguration`] by reading a cache snapshot.
//! Because the two watches are not ordered with respect to each other, an ingress may reference a
//! service the cache has not yet observed; in that case the resolver performs a single point
//! lookup and refreshes the cache from its result.
//!
//! [`RoutingConfiguration`]: ingress_controller_core::RoutingConfiguration

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod endpoints;
pub mod ingress;
pub mod membership;
mod resolve;
pub mod rules;
pub mod service;


pub use self::{
    ingress::IngressEvent,
    membership::{MembershipCache, SharedCache},
    resolve::{ResolveError, Resolver},
};
