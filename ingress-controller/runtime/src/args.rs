use crate::{
    index::{self, MembershipCache, Resolver},
    k8s,
    lookup::ApiLookup,
    metrics::Metrics,
    publish::Publisher,
    reconcile::Reconciler,
    supervisor::{ProcessSpec, Supervisor},
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::path::PathBuf;
use tokio::{sync::mpsc, time::Duration};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "ingress-controller",
    about = "Publishes ingress routes to a supervised routing process"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "ingress_controller=info,warn",
        env = "INGRESS_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The namespace whose ingresses and endpoints are watched.
    #[clap(long, default_value = "default")]
    namespace: String,

    /// Where the routing configuration is written.
    #[clap(long, default_value = "/app/Ingress/ingress.json")]
    config_path: PathBuf,

    #[clap(long, default_value = "dotnet")]
    proxy_program: String,

    /// Arguments passed to the routing process. May be repeated.
    #[clap(long = "proxy-arg", default_value = "/app/Ingress/Ingress.dll")]
    proxy_args: Vec<String>,

    #[clap(long, default_value = "/app/Ingress")]
    proxy_workdir: PathBuf,

    /// Seconds the routing process has to exit after SIGTERM before it is
    /// killed.
    #[clap(long, default_value = "10")]
    proxy_grace_period_secs: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            namespace,
            config_path,
            proxy_program,
            proxy_args,
            proxy_workdir,
            proxy_grace_period_secs,
        } = self;

        let cache = MembershipCache::shared();

        let mut prom = <Registry>::default();
        let metrics = Metrics::register(
            prom.sub_registry_with_prefix("ingress_controller"),
            cache.clone(),
        );

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;
        let client = runtime.client();

        // Endpoints feed the membership cache directly.
        let endpoints_index = index::endpoints::Index::shared(&namespace, cache.clone());
        let endpoints = k8s::Watch::<k8s::Endpoints>::namespaced(client.clone(), &namespace)
            .instrument(info_span!("watch", kind = "endpoints"));
        let endpoints_task = tokio::spawn(
            kubert::index::namespaced(endpoints_index, endpoints.into_stream())
                .instrument(info_span!("endpoints")),
        );

        // Ingress changes are queued for the reconciler.
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let ingress_index = index::ingress::Index::shared(&namespace, events_tx);
        let ingresses = k8s::Watch::<k8s::Ingress>::namespaced(client.clone(), &namespace)
            .instrument(info_span!("watch", kind = "ingresses"));
        let ingresses_task = tokio::spawn(
            kubert::index::namespaced(ingress_index, ingresses.into_stream())
                .instrument(info_span!("ingresses")),
        );

        let (supervisor, supervisor_task) = Supervisor::spawn(ProcessSpec {
            program: proxy_program,
            args: proxy_args,
            working_dir: proxy_workdir,
            grace_period: Duration::from_secs(proxy_grace_period_secs),
        });

        let resolver = Resolver::new(&namespace, cache, ApiLookup::new(client, metrics.clone()));
        let reconciler = Reconciler::new(
            resolver,
            Publisher::new(config_path),
            supervisor.clone(),
            metrics,
        );
        let reconcile_task =
            tokio::spawn(reconciler.run(events_rx).instrument(info_span!("reconcile")));

        info!(%namespace, "Watching ingresses and endpoints");

        // Block the main thread on the shutdown signal. Once it fires, close the
        // watches, let the reconciler drain, and stop the routing process.
        let res = runtime.run().await;

        endpoints_task.abort();
        ingresses_task.abort();
        if let Err(error) = reconcile_task.await {
            tracing::warn!(%error, "Reconciler failed");
        }
        if let Err(error) = supervisor.shutdown().await {
            tracing::warn!(%error, "Failed to shut down routing process");
        }
        if let Err(error) = supervisor_task.await {
            tracing::warn!(%error, "Supervisor failed");
        }

        if res.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
