use super::*;
use crate::{wait_for_cache_sync, SplitWatcher};
use kube::runtime::reflector::ObjectRef;
use std::future;
use tokio::time::{self, Duration};

/// Drains every key that is currently queued.
async fn drain(queue: &Queue) -> Vec<String> {
    let mut keys = Vec::new();
    while !queue.is_empty() {
        let key = queue.get().await.unwrap();
        queue.done(&key);
        keys.push(key);
    }
    keys.sort();
    keys
}

#[tokio::test]
async fn initial_list_queues_keys_once_synced() {
    let queue = mk_queue();
    let mut watcher = SplitWatcher::new(queue.clone());
    let store = watcher.store();
    let synced = watcher.synced();
    assert!(!watcher.has_synced());

    watcher.handle(Event::Init);
    watcher.handle(Event::InitApply(mk_split("ns", "split-a", "a", &[])));
    watcher.handle(Event::InitApply(mk_split("ns", "split-b", "b", &[])));

    // Nothing is visible until the list completes.
    assert!(queue.is_empty());
    assert!(store.get(&ObjectRef::new("split-a").within("ns")).is_none());
    assert!(!synced.has_synced());

    watcher.handle(Event::InitDone);
    assert!(watcher.has_synced());
    assert!(synced.has_synced());
    assert!(store.get(&ObjectRef::new("split-a").within("ns")).is_some());
    assert_eq!(drain(&queue).await, ["ns/split-a/a", "ns/split-b/b"]);
}

#[tokio::test]
async fn apply_and_delete_queue_keys() {
    let queue = mk_queue();
    let mut watcher = SplitWatcher::new(queue.clone());
    let store = watcher.store();
    watcher.handle(Event::Init);
    watcher.handle(Event::InitDone);
    assert!(queue.is_empty());

    let split = mk_split("ns", "split", "root", &[("a", "1")]);
    watcher.handle(Event::Apply(split.clone()));
    assert_eq!(drain(&queue).await, ["ns/split/root"]);

    // Updates are not diffed; any change requeues the key.
    watcher.handle(Event::Apply(split.clone()));
    assert_eq!(drain(&queue).await, ["ns/split/root"]);

    watcher.handle(Event::Delete(split));
    assert!(store.get(&ObjectRef::new("split").within("ns")).is_none());
    assert_eq!(drain(&queue).await, ["ns/split/root"]);
}

#[tokio::test]
async fn root_service_change_queues_previous_key() {
    let queue = mk_queue();
    let mut watcher = SplitWatcher::new(queue.clone());
    watcher.handle(Event::Init);
    watcher.handle(Event::InitApply(mk_split("ns", "split", "old-root", &[])));
    watcher.handle(Event::InitDone);
    assert_eq!(drain(&queue).await, ["ns/split/old-root"]);

    watcher.handle(Event::Apply(mk_split("ns", "split", "new-root", &[])));
    assert_eq!(drain(&queue).await, ["ns/split/new-root", "ns/split/old-root"]);
}

#[tokio::test]
async fn relist_queues_missed_deletions() {
    let queue = mk_queue();
    let mut watcher = SplitWatcher::new(queue.clone());
    let store = watcher.store();
    watcher.handle(Event::Init);
    watcher.handle(Event::InitApply(mk_split("ns", "kept", "a", &[])));
    watcher.handle(Event::InitApply(mk_split("ns", "gone", "b", &[])));
    watcher.handle(Event::InitDone);
    drain(&queue).await;

    // The watch restarts and `gone` was deleted while it was down.
    watcher.handle(Event::Init);
    watcher.handle(Event::InitApply(mk_split("ns", "kept", "a", &[])));
    watcher.handle(Event::InitDone);

    assert!(store.get(&ObjectRef::new("gone").within("ns")).is_none());
    assert_eq!(drain(&queue).await, ["ns/gone/b", "ns/kept/a"]);
}

#[tokio::test]
async fn ignores_splits_without_namespace() {
    let queue = mk_queue();
    let mut watcher = SplitWatcher::new(queue.clone());
    let mut split = mk_split("ns", "split", "root", &[]);
    split.metadata.namespace = None;
    watcher.handle(Event::Apply(split));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn run_consumes_event_stream() {
    let queue = mk_queue();
    let watcher = SplitWatcher::new(queue.clone());
    let synced = watcher.synced();
    let events = futures::stream::iter([
        Event::Init,
        Event::InitApply(mk_split("ns", "split", "root", &[])),
        Event::InitDone,
    ]);
    watcher.run(events).await;

    assert!(synced.has_synced());
    assert_eq!(drain(&queue).await, ["ns/split/root"]);
}

#[tokio::test]
async fn cache_sync_completes() {
    let mut watcher = SplitWatcher::new(mk_queue());
    let synced = watcher.synced();
    let wait = tokio::spawn(wait_for_cache_sync(future::pending::<()>(), [synced]));

    watcher.handle(Event::Init);
    watcher.handle(Event::InitDone);
    assert!(time::timeout(Duration::from_secs(1), wait)
        .await
        .expect("sync must complete")
        .unwrap());
}

#[tokio::test]
async fn cache_sync_aborts_on_stop() {
    let watcher = SplitWatcher::new(mk_queue());
    assert!(!wait_for_cache_sync(future::ready(()), [watcher.synced()]).await);
}

#[tokio::test]
async fn cache_sync_fails_if_watch_ends_unsynced() {
    let watcher = SplitWatcher::new(mk_queue());
    let synced = watcher.synced();
    drop(watcher);
    assert!(!wait_for_cache_sync(future::pending::<()>(), [synced]).await);
}
