use crate::{
    metrics::ControllerMetrics,
    reconcile::{ProfileClient, Reconciler},
    sync::{wait_for_cache_sync, Synced},
    Error, Queue,
};
use linkerd_smi_adaptor_core::SplitKey;
use std::{future::Future, num::NonZeroUsize, sync::Arc};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

/// Drains the queue with a pool of workers.
///
/// The queue never hands the same key to two workers at once, so workers
/// need no coordination beyond it.
pub struct Controller<C> {
    queue: Queue,
    reconciler: Arc<Reconciler<C>>,
    metrics: ControllerMetrics,
}

/// Releases a key back to the queue when processing ends, however it ends.
struct InFlight<'a> {
    queue: &'a Queue,
    key: String,
}

// === impl Controller ===

impl<C> Controller<C>
where
    C: ProfileClient + 'static,
{
    pub fn new(queue: Queue, reconciler: Reconciler<C>, metrics: ControllerMetrics) -> Self {
        Self {
            queue,
            reconciler: Arc::new(reconciler),
            metrics,
        }
    }

    /// Runs workers once the cache has synced, until `stop` completes.
    ///
    /// On stop, the queue is shut down and in-flight reconciliations are
    /// allowed to finish. The value produced by `stop` is held until then.
    pub async fn run<S>(self, synced: Synced, workers: NonZeroUsize, stop: S) -> Result<(), Error>
    where
        S: Future,
    {
        tokio::pin!(stop);

        info!("Waiting for TrafficSplit cache to sync");
        if !wait_for_cache_sync(stop.as_mut(), [synced]).await {
            return Err(Error::CacheSyncAborted);
        }

        info!(%workers, "Starting workers");
        let mut tasks = JoinSet::new();
        for id in 0..workers.get() {
            self.spawn_worker(&mut tasks, id);
        }

        // A worker only exits early if it panics. Replace it so that the queue
        // keeps draining.
        let mut next_id = workers.get();
        let release = loop {
            tokio::select! {
                release = stop.as_mut() => break release,
                Some(res) = tasks.join_next() => {
                    match res {
                        Err(error) => warn!(%error, "Worker failed"),
                        Ok(()) => warn!("Worker exited"),
                    }
                    if !self.queue.is_shutting_down() {
                        self.spawn_worker(&mut tasks, next_id);
                        next_id += 1;
                    }
                }
            }
        };

        info!("Shutting down");
        self.queue.shut_down();
        while let Some(res) = tasks.join_next().await {
            if let Err(error) = res {
                warn!(%error, "Worker failed");
            }
        }
        drop(release);

        debug!("Workers stopped");
        Ok(())
    }

    fn spawn_worker(&self, tasks: &mut JoinSet<()>, id: usize) {
        let worker = self.clone();
        tasks.spawn(
            async move { while worker.process_next().await {} }
                .instrument(info_span!("worker", id)),
        );
    }

    /// Processes a single key.
    ///
    /// Returns false once the queue has shut down.
    pub async fn process_next(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let in_flight = InFlight {
            queue: &self.queue,
            key,
        };
        self.process(&in_flight.key).await;
        true
    }

    async fn process(&self, key: &str) {
        let split_key = match key.parse::<SplitKey>() {
            Ok(split_key) => split_key,
            Err(error) => {
                warn!(%error, "Discarding key");
                self.queue.forget(key);
                self.metrics.invalid_key();
                return;
            }
        };

        let span = info_span!(
            "reconcile",
            namespace = %split_key.namespace,
            name = %split_key.name
        );
        match self.reconciler.reconcile(&split_key).instrument(span).await {
            Ok(outcome) => {
                debug!(%key, outcome = outcome.as_str(), "Reconciled");
                self.queue.forget(key);
                self.metrics.reconciled(outcome);
            }
            Err(error) => {
                warn!(
                    %key,
                    requeues = self.queue.num_requeues(key),
                    error = format_args!("{error:#}"),
                    "Failed to reconcile"
                );
                self.queue.add_rate_limited(key.to_string());
                self.metrics.failed();
            }
        }
    }
}

impl<C> Clone for Controller<C> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            reconciler: self.reconciler.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

// === impl InFlight ===

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.queue.done(&self.key);
    }
}
