use crate::{
    controller::{
        Controller, ControllerMetrics, ExponentialBackoff, KubeProfiles, Queue, Reconciler,
        SplitWatcher,
    },
    core::DEFAULT_CLUSTER_DOMAIN,
    k8s::{self, TrafficSplit},
};
use anyhow::{bail, Result};
use clap::Parser;
use futures::prelude::*;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::num::NonZeroUsize;
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "smi-adaptor",
    about = "Converts SMI TrafficSplits into ServiceProfile destination overrides"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "linkerd=info,warn",
        env = "LINKERD_SMI_ADAPTOR_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    #[clap(long, default_value = DEFAULT_CLUSTER_DOMAIN)]
    cluster_domain: String,

    /// Only watch TrafficSplits in this namespace.
    ///
    /// TrafficSplits in all namespaces are watched by default.
    #[clap(long)]
    namespace: Option<String>,

    /// The number of TrafficSplits that may be reconciled concurrently.
    #[clap(long, default_value = "1")]
    workers: NonZeroUsize,

    /// Bounds each request to the Kubernetes API.
    #[clap(long, default_value = "5000")]
    api_timeout_ms: u64,

    #[clap(long, default_value = "5")]
    requeue_base_delay_ms: u64,

    #[clap(long, default_value = "1000")]
    requeue_max_delay_secs: u64,
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
            cluster_domain,
            namespace,
            workers,
            api_timeout_ms,
            requeue_base_delay_ms,
            requeue_max_delay_secs,
        } = self;

        let queue = Queue::new(ExponentialBackoff::new(
            Duration::from_millis(requeue_base_delay_ms),
            Duration::from_secs(requeue_max_delay_secs),
        ));

        let mut prom = <Registry>::default();
        let metrics =
            ControllerMetrics::register(prom.sub_registry_with_prefix("smi_adaptor"), queue.clone());

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // Spawn the TrafficSplit watch, which feeds the queue.
        let splits = match namespace.as_deref() {
            Some(ns) => {
                info!(namespace = %ns, "Watching TrafficSplits");
                let api = k8s::Api::<TrafficSplit>::namespaced(runtime.client(), ns);
                runtime.watch(api, watcher::Config::default()).boxed()
            }
            None => {
                info!("Watching TrafficSplits in all namespaces");
                runtime
                    .watch_all::<TrafficSplit>(watcher::Config::default())
                    .boxed()
            }
        };
        let watcher = SplitWatcher::new(queue.clone());
        let synced = watcher.synced();
        let reconciler = Reconciler::new(
            watcher.store(),
            KubeProfiles::new(runtime.client(), Duration::from_millis(api_timeout_ms)),
            cluster_domain,
        );
        tokio::spawn(watcher.run(splits).instrument(info_span!("trafficsplits")));

        // Run the workers until shutdown is signaled. The shutdown is held
        // until in-flight reconciliations complete.
        let shutdown = runtime.shutdown_handle();
        let controller = tokio::spawn(
            Controller::new(queue, reconciler, metrics)
                .run(synced, workers, shutdown.signaled())
                .instrument(info_span!("controller")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        controller.await??;
        Ok(())
    }
}
