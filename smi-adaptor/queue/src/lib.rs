#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! A deduplicating, rate-limited work queue.
//!
//! A key is held by at most one consumer at a time. Keys added while they are
//! being processed are deferred until the consumer calls [`WorkQueue::done`],
//! so that the same key is never processed concurrently.

mod backoff;

pub use self::backoff::ExponentialBackoff;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use parking_lot::Mutex;
use std::{borrow::Borrow, collections::VecDeque, fmt, hash::Hash, sync::Arc};
use tokio::{sync::Notify, time};

pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

struct Inner<K> {
    state: Mutex<State<K>>,
    notify: Notify,
    backoff: ExponentialBackoff,
}

struct State<K> {
    /// Keys waiting to be processed, in arrival order.
    queue: VecDeque<K>,

    /// Keys that need processing, whether queued or deferred behind an
    /// in-flight run.
    dirty: HashSet<K>,

    /// Keys currently held by a consumer.
    processing: HashSet<K>,

    /// Consecutive failures per key.
    failures: HashMap<K, u32>,

    shutting_down: bool,
}

// === impl WorkQueue ===

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    failures: HashMap::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                backoff,
            }),
        }
    }

    /// Marks a key as needing processing.
    ///
    /// Adding a key that is already queued does nothing. Adding a key that is
    /// being processed queues it again once [`WorkQueue::done`] is called.
    pub fn add(&self, key: K) {
        {
            let mut state = self.inner.state.lock();
            if state.shutting_down || !state.dirty.insert(key.clone()) {
                return;
            }
            if state.processing.contains(&key) {
                return;
            }
            state.queue.push_back(key);
        }
        self.inner.notify.notify_one();
    }

    /// Adds a key once `delay` has elapsed.
    pub fn add_after(&self, key: K, delay: time::Duration) {
        if delay.is_zero() {
            return self.add(key);
        }
        if self.is_shutting_down() {
            return;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Adds a key after a delay that grows exponentially with each
    /// consecutive call for the same key.
    pub fn add_rate_limited(&self, key: K) {
        let failures = {
            let mut state = self.inner.state.lock();
            let failures = state.failures.entry(key.clone()).or_default();
            let prior = *failures;
            *failures = failures.saturating_add(1);
            prior
        };
        let delay = self.inner.backoff.delay(failures);
        tracing::trace!(?delay, failures, "Requeueing");
        self.add_after(key, delay);
    }

    /// Clears the failure history of a key.
    pub fn forget<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.state.lock().failures.remove(key);
    }

    /// Returns the number of consecutive failures recorded for a key.
    pub fn num_requeues<Q>(&self, key: &Q) -> u32
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner
            .state
            .lock()
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Waits for the next key to process.
    ///
    /// Returns `None` once the queue has been shut down and drained. Every
    /// key returned must be released with [`WorkQueue::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Releases a key returned by [`WorkQueue::get`].
    pub fn done<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let requeued = {
            let mut state = self.inner.state.lock();
            match state.processing.take(key) {
                Some(key) if state.dirty.contains::<K>(&key) => {
                    state.queue.push_back(key);
                    true
                }
                _ => false,
            }
        };
        if requeued {
            self.inner.notify.notify_one();
        }
    }

    /// Stops accepting new keys and wakes all waiting consumers.
    pub fn shut_down(&self) {
        self.inner.state.lock().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }

    /// Returns the number of keys waiting to be processed.
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> fmt::Debug for WorkQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("WorkQueue")
            .field("queued", &state.queue.len())
            .field("processing", &state.processing.len())
            .field("shutting_down", &state.shutting_down)
            .finish()
    }
}
