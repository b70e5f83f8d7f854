use crate::{
    core::{DiscoverBackend, RoutingConfiguration},
    index::{IngressEvent, Resolver},
    k8s::{self, ResourceExt},
    metrics::Metrics,
    publish::Publisher,
    supervisor::{Supervisor, SupervisorError},
};
use tokio::sync::mpsc::UnboundedReceiver;

/// Drains ingress events and drives the publisher and supervisor.
///
/// Events are handled strictly in the order they were queued. The most
/// recently applied ingress is re-resolved from the membership cache whenever
/// it changes, so the published configuration follows pods as they come and
/// go. Only ingress events may trigger backend lookups.
pub(crate) struct Reconciler<D> {
    resolver: Resolver<D>,
    publisher: Publisher,
    supervisor: Supervisor,
    metrics: Metrics,

    current: Option<k8s::Ingress>,
    published: Option<RoutingConfiguration>,
}

// === impl Reconciler ===

impl<D: DiscoverBackend> Reconciler<D> {
    pub(crate) fn new(
        resolver: Resolver<D>,
        publisher: Publisher,
        supervisor: Supervisor,
        metrics: Metrics,
    ) -> Self {
        Self {
            resolver,
            publisher,
            supervisor,
            metrics,
            current: None,
            published: None,
        }
    }

    pub(crate) async fn run(mut self, mut events: UnboundedReceiver<IngressEvent>) {
        let mut membership = self.resolver.cache().subscribe();
        loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(event) => self.process(event).await,
                    None => break,
                },

                res = membership.changed() => {
                    if res.is_err() {
                        break;
                    }
                    self.refresh();
                }
            }
        }
        tracing::debug!("Ingress events closed");
    }

    async fn process(&mut self, event: IngressEvent) {
        match event {
            IngressEvent::Added(ingress) => {
                tracing::info!(ingress = %ingress.name_unchecked(), "Ingress added");
                let config = self.resolver.resolve(&ingress).await;
                self.current = Some(ingress);
                if self.publish(config) {
                    self.start().await;
                }
            }

            IngressEvent::Modified(ingress) => {
                tracing::info!(ingress = %ingress.name_unchecked(), "Ingress modified");
                let config = self.resolver.resolve(&ingress).await;
                self.current = Some(ingress);
                self.publish(config);
            }

            IngressEvent::Deleted { name } => {
                tracing::info!(ingress = %name, "Ingress deleted");
                if self
                    .current
                    .as_ref()
                    .is_some_and(|ingress| ingress.name_unchecked() == name)
                {
                    self.current = None;
                }
                if let Err(error) = self.supervisor.stop().await {
                    tracing::warn!(%error, "Failed to stop routing process");
                }
            }
        }
    }

    /// Re-resolves the current ingress against a changed membership snapshot.
    fn refresh(&mut self) {
        let Some(ingress) = self.current.as_ref() else {
            return;
        };
        let config = self.resolver.resolve_cached(ingress);
        if self.published.as_ref() == Some(&config) {
            tracing::trace!("Routing configuration unchanged");
            return;
        }
        tracing::info!(ingress = %ingress.name_unchecked(), "Service membership changed");
        self.publish(config);
    }

    fn publish(&mut self, config: RoutingConfiguration) -> bool {
        match self.publisher.publish(&config) {
            Ok(()) => {
                tracing::info!(
                    path = %self.publisher.path().display(),
                    mappings = config.len(),
                    "Published routing configuration"
                );
                self.metrics.publish(true);
                self.published = Some(config);
                true
            }
            Err(error) => {
                tracing::error!(%error, "Failed to publish routing configuration");
                self.metrics.publish(false);
                false
            }
        }
    }

    async fn start(&self) {
        match self.supervisor.start().await {
            Ok(pid) => {
                tracing::debug!(pid, "Routing process started");
                self.metrics.start(true);
            }
            Err(SupervisorError::AlreadyRunning { pid }) => {
                tracing::debug!(pid, "Routing process already running");
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to start routing process");
                self.metrics.start(false);
            }
        }
    }
}
