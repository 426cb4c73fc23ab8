use crate::{sync::Synced, Queue};
use ahash::AHashSet as HashSet;
use futures::prelude::*;
use kube::runtime::{
    reflector::{store::Writer, ObjectRef, Store},
    watcher::Event,
};
use linkerd_smi_adaptor_core::SplitKey;
use linkerd_smi_adaptor_k8s_api::{ResourceExt, TrafficSplit};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Mirrors TrafficSplits into a local cache and queues the key of every
/// split that changes.
///
/// Keys are only queued after the cache reflects the change, so a worker
/// never reconciles against a state older than the event that woke it.
pub struct SplitWatcher {
    writer: Writer<TrafficSplit>,
    queue: Queue,
    synced: watch::Sender<bool>,
    relist: Option<Relist>,
}

/// Tracks a (re)list in progress. The cache is only replaced when the list
/// completes.
#[derive(Default)]
struct Relist {
    /// Keys present in the cache before the list started.
    previous: Vec<SplitKey>,
    /// Keys returned by the list so far.
    listed: Vec<SplitKey>,
}

// === impl SplitWatcher ===

impl SplitWatcher {
    pub fn new(queue: Queue) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            writer: Writer::default(),
            queue,
            synced,
            relist: None,
        }
    }

    pub fn store(&self) -> Store<TrafficSplit> {
        self.writer.as_reader()
    }

    pub fn synced(&self) -> Synced {
        Synced::new(self.synced.subscribe())
    }

    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Processes events until the stream ends.
    pub async fn run<S>(mut self, events: S)
    where
        S: Stream<Item = Event<TrafficSplit>>,
    {
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            self.handle(event);
        }
        warn!("TrafficSplit watch terminated");
    }

    pub fn handle(&mut self, event: Event<TrafficSplit>) {
        match &event {
            Event::Apply(split) => {
                let previous = self
                    .writer
                    .as_reader()
                    .get(&ObjectRef::from_obj(split))
                    .and_then(|prior| SplitKey::from_split(&prior));
                self.writer.apply_watcher_event(&event);

                let key = self.key(split);
                // If the root service changed, the profile for the old service
                // must be cleaned up as well.
                if let Some(previous) = previous.filter(|prev| Some(prev) != key.as_ref()) {
                    debug!(key = %previous, "TrafficSplit root service changed");
                    self.enqueue(previous);
                }
                if let Some(key) = key {
                    self.enqueue(key);
                }
            }

            Event::Delete(split) => {
                self.writer.apply_watcher_event(&event);
                if let Some(key) = self.key(split) {
                    self.enqueue(key);
                }
            }

            Event::Init => {
                let previous = self
                    .writer
                    .as_reader()
                    .state()
                    .iter()
                    .filter_map(|split| SplitKey::from_split(split))
                    .collect();
                self.relist = Some(Relist {
                    previous,
                    listed: Vec::new(),
                });
                self.writer.apply_watcher_event(&event);
            }

            Event::InitApply(split) => {
                self.writer.apply_watcher_event(&event);
                if let Some(key) = self.key(split) {
                    self.relist.get_or_insert_with(Default::default).listed.push(key);
                }
            }

            Event::InitDone => {
                self.writer.apply_watcher_event(&event);

                let Relist { previous, listed } = self.relist.take().unwrap_or_default();
                let current = listed.iter().cloned().collect::<HashSet<_>>();
                // Objects deleted while the watch was down vanish from the
                // cache without a delete event.
                let stale = previous
                    .into_iter()
                    .filter(|key| !current.contains(key))
                    .collect::<Vec<_>>();
                info!(
                    splits = listed.len(),
                    stale = stale.len(),
                    "TrafficSplits listed"
                );
                for key in listed.into_iter().chain(stale) {
                    self.enqueue(key);
                }

                self.synced.send_replace(true);
            }
        }
    }

    fn key(&self, split: &TrafficSplit) -> Option<SplitKey> {
        let key = SplitKey::from_split(split);
        if key.is_none() {
            warn!(name = %split.name_any(), "Ignoring TrafficSplit without a namespace");
        }
        key
    }

    fn enqueue(&self, key: SplitKey) {
        debug!(%key, "Queueing");
        self.queue.add(key.to_string());
    }
}
