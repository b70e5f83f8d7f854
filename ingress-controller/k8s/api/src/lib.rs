#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod watch;

pub use self::watch::{Event, Watch};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{EndpointAddress, EndpointSubset, Endpoints, Service, ServicePort, ServiceSpec},
        networking::v1::{
            HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
            IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
        },
    },
    apimachinery::pkg::util::intstr::IntOrString,
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, ResourceExt},
    runtime::watcher,
    Client, Resource,
};
