use futures::future;
use std::future::Future;
use tokio::sync::watch;

/// Reports whether a watch has completed its initial list.
#[derive(Clone, Debug)]
pub struct Synced(watch::Receiver<bool>);

// === impl Synced ===

impl Synced {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    pub fn has_synced(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits for the initial list to complete.
    ///
    /// Returns false if the watch stops before it ever syncs.
    pub async fn synced(mut self) -> bool {
        self.0.wait_for(|synced| *synced).await.is_ok()
    }
}

/// Waits until all of the given caches have synced.
///
/// Returns false if `stop` completes first, or if any cache stops before it
/// syncs.
pub async fn wait_for_cache_sync<S>(stop: S, caches: impl IntoIterator<Item = Synced>) -> bool
where
    S: Future,
{
    let synced = future::join_all(caches.into_iter().map(Synced::synced));
    tokio::select! {
        biased;
        _ = stop => false,
        synced = synced => synced.into_iter().all(|ok| ok),
    }
}
