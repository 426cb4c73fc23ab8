#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Keeps ServiceProfiles in step with SMI TrafficSplits.
//!
//! TrafficSplit changes observed by a [`SplitWatcher`] are queued by key and
//! handed to a [`Controller`], whose workers drive a [`Reconciler`] until the
//! ServiceProfile derived from each split carries its backends as destination
//! overrides.

mod controller;
mod metrics;
mod reconcile;
mod sync;
mod watch;


pub use self::{
    controller::Controller,
    metrics::ControllerMetrics,
    reconcile::{KubeProfiles, Outcome, ProfileClient, Reconciler},
    sync::{wait_for_cache_sync, Synced},
    watch::SplitWatcher,
};
pub use linkerd_smi_adaptor_queue::ExponentialBackoff;
use tokio::time::Duration;

/// Queues TrafficSplit keys in their `<namespace>/<name>/<service>` form.
pub type Queue = linkerd_smi_adaptor_queue::WorkQueue<String>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("shutdown before the TrafficSplit cache synced")]
    CacheSyncAborted,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Kube(#[from] kube::Error),
}
