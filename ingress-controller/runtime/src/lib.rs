#![deny(rust_2018_idioms, unsafe_code)]

pub use ingress_controller_core as core;
pub use ingress_controller_k8s_api as k8s;
pub use ingress_controller_k8s_index as index;

mod args;
mod lookup;
pub mod metrics;
pub mod publish;
mod reconcile;
pub mod supervisor;

pub use self::args::Args;
