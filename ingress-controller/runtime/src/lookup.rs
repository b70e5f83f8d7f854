use crate::{
    core::{BackendLookup, DiscoverBackend},
    index::{endpoints, service},
    k8s,
    metrics::Metrics,
};
use anyhow::Result;

/// Looks up backends directly against the Kubernetes API.
#[derive(Clone)]
pub(crate) struct ApiLookup {
    client: k8s::Client,
    metrics: Metrics,
}

impl ApiLookup {
    pub(crate) fn new(client: k8s::Client, metrics: Metrics) -> Self {
        Self { client, metrics }
    }
}

impl std::fmt::Debug for ApiLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiLookup").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl DiscoverBackend for ApiLookup {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<BackendLookup> {
        self.metrics.lookup();

        let eps = k8s::Api::<k8s::Endpoints>::namespaced(self.client.clone(), namespace)
            .list(&k8s::ListParams::default())
            .await?;
        let svc = k8s::Api::<k8s::Service>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await?;
        tracing::debug!(
            %namespace,
            service = %name,
            endpoints = eps.items.len(),
            found = svc.is_some(),
            "looked up backend"
        );

        Ok(BackendLookup {
            endpoints: endpoints::snapshot(&eps.items),
            service: svc.as_ref().map(service::ports),
        })
    }
}
