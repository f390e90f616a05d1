//! Integration tests for ConfigStore.
//!
//! Covers the read/merge contract, set_config persistence, the
//! configure teardown/rebuild cycle, and backend selection.

use async_trait::async_trait;
use extension_config::config::{ConfigStore, Configuration, Teardown};
use extension_config::error::{StoreError, StoreResult};
use extension_config::storage::{
    ChangeListener, ChangeNotifier, MemoryStorage, StorageBackend, select_backend,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Lifecycle events recorded by the test handler.
#[derive(Debug, Clone, PartialEq)]
enum Event {
    Create(u64, Value),
    Destroy(u64),
}

/// A store over fresh in-memory storage with the extension defaults.
fn memory_store() -> (Arc<MemoryStorage>, ConfigStore) {
    let storage = Arc::new(MemoryStorage::new());
    let store = ConfigStore::with_extension_defaults(storage.clone());
    (storage, store)
}

/// Register a handler that reports every create/destroy on a channel.
/// Each cycle is numbered so a destroy can be matched to its create.
async fn record_lifecycle(
    store: &ConfigStore,
) -> (
    extension_config::config::ConfigureHandle,
    mpsc::UnboundedReceiver<Event>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cycle = Arc::new(AtomicUsize::new(0));
    let handle = store
        .configure(move |config: Configuration| {
            let tx = tx.clone();
            let n = cycle.fetch_add(1, Ordering::SeqCst) as u64;
            async move {
                let _ = tx.send(Event::Create(n, Value::from(config)));
                Teardown::from_fn(move || {
                    let _ = tx.send(Event::Destroy(n));
                })
            }
        })
        .await
        .expect("configure");
    (handle, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for lifecycle event")
        .expect("event channel closed")
}

// =============================================================================
// read_config / set_config
// =============================================================================

#[tokio::test]
async fn test_empty_store_reads_exact_defaults() {
    let (_storage, store) = memory_store();
    let config = store.read_config().await.unwrap();
    assert_eq!(Value::from(config), json!({"replaceWithLogo": true}));
}

#[tokio::test]
async fn test_set_replace_with_logo_false() {
    let (_storage, store) = memory_store();
    store.set_config("replaceWithLogo", false).await.unwrap();
    let config = store.read_config().await.unwrap();
    assert_eq!(Value::from(config), json!({"replaceWithLogo": false}));
}

#[tokio::test]
async fn test_set_new_key_keeps_defaults() {
    let (_storage, store) = memory_store();
    store.set_config("newKey", "x").await.unwrap();
    let config = store.read_config().await.unwrap();
    assert_eq!(
        Value::from(config),
        json!({"replaceWithLogo": true, "newKey": "x"})
    );
}

#[tokio::test]
async fn test_sequence_of_sets_later_wins() {
    let (_storage, store) = memory_store();
    let writes: Vec<(&str, Value)> = vec![
        ("a", json!(1)),
        ("b", json!("two")),
        ("a", json!(3)),
        ("replaceWithLogo", json!(false)),
        ("c", json!(true)),
        ("b", json!(null)),
    ];

    let mut expected = Configuration::extension_defaults();
    for (key, value) in &writes {
        store.set_config(*key, value.clone()).await.unwrap();
        expected.insert(*key, value.clone());
    }

    assert_eq!(store.read_config().await.unwrap(), expected);
    assert_eq!(
        Value::from(expected),
        json!({"replaceWithLogo": false, "a": 3, "b": null, "c": true})
    );
}

#[tokio::test]
async fn test_stored_values_from_elsewhere_are_merged() {
    let seeded = match json!({"legacy": "kept"}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let store = ConfigStore::with_extension_defaults(Arc::new(MemoryStorage::with_items(seeded)));
    let config = store.read_config().await.unwrap();
    assert_eq!(
        Value::from(config),
        json!({"replaceWithLogo": true, "legacy": "kept"})
    );
}

#[tokio::test]
async fn test_independent_stores_with_different_defaults() {
    let storage = Arc::new(MemoryStorage::new());
    let a = ConfigStore::with_extension_defaults(storage.clone());
    let b = ConfigStore::new(
        storage.clone(),
        [("replaceWithLogo", json!(false)), ("theme", json!("dark"))]
            .into_iter()
            .collect(),
    );

    assert!(a.read_config().await.unwrap().replace_with_logo());
    let from_b = b.read_config().await.unwrap();
    assert!(!from_b.replace_with_logo());
    assert_eq!(from_b.get_str("theme"), Some("dark"));
}

#[tokio::test]
async fn test_concurrent_sets_of_disjoint_keys_both_land() {
    // Calls are not serialized. Each writes the merged object it read, and
    // the memory backend merges top-level keys, so disjoint keys survive.
    let (_storage, store) = memory_store();
    let (r1, r2) = tokio::join!(store.set_config("x", 1), store.set_config("y", 2));
    r1.unwrap();
    r2.unwrap();

    let config = store.read_config().await.unwrap();
    assert!(config.replace_with_logo());
    assert_eq!(config.get("x"), Some(&json!(1)));
    assert_eq!(config.get("y"), Some(&json!(2)));
}

// =============================================================================
// configure
// =============================================================================

#[tokio::test]
async fn test_configure_creates_once_with_initial_config() {
    let (storage, store) = memory_store();
    storage
        .set(match json!({"replaceWithLogo": false}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        })
        .await
        .unwrap();

    let (handle, mut rx) = record_lifecycle(&store).await;

    // on_create has already run by the time configure returns
    assert_eq!(
        rx.try_recv().unwrap(),
        Event::Create(0, json!({"replaceWithLogo": false}))
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(handle.generation(), 0);
}

#[tokio::test]
async fn test_change_event_tears_down_then_recreates() {
    let (storage, store) = memory_store();
    let (mut handle, mut rx) = record_lifecycle(&store).await;
    assert_eq!(
        next_event(&mut rx).await,
        Event::Create(0, json!({"replaceWithLogo": true}))
    );

    storage.simulate_change();

    assert_eq!(next_event(&mut rx).await, Event::Destroy(0));
    assert_eq!(
        next_event(&mut rx).await,
        Event::Create(1, json!({"replaceWithLogo": true}))
    );
    assert_eq!(timeout(WAIT, handle.wait_for_generation(1)).await.unwrap(), Some(1));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_set_config_triggers_rebuild_with_fresh_read() {
    let (_storage, store) = memory_store();
    let (mut handle, mut rx) = record_lifecycle(&store).await;
    next_event(&mut rx).await;

    store.set_config("newKey", "x").await.unwrap();

    assert_eq!(next_event(&mut rx).await, Event::Destroy(0));
    assert_eq!(
        next_event(&mut rx).await,
        Event::Create(1, json!({"replaceWithLogo": true, "newKey": "x"}))
    );
    timeout(WAIT, handle.wait_for_generation(1)).await.unwrap();
    assert_eq!(handle.current().get_str("newKey"), Some("x"));
}

#[tokio::test]
async fn test_each_teardown_runs_exactly_once_across_cycles() {
    let (storage, store) = memory_store();
    let (mut handle, mut rx) = record_lifecycle(&store).await;
    next_event(&mut rx).await;

    for cycle in 0..3u64 {
        storage.simulate_change();
        assert_eq!(next_event(&mut rx).await, Event::Destroy(cycle));
        assert!(matches!(next_event(&mut rx).await, Event::Create(n, _) if n == cycle + 1));
        timeout(WAIT, handle.wait_for_generation(cycle + 1))
            .await
            .unwrap();
    }
    assert!(rx.try_recv().is_err());
    assert!(handle.is_active());
}

#[tokio::test]
async fn test_async_teardown_completes_before_recreate() {
    let (storage, store) = memory_store();
    let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();

    let mut handle = store
        .configure(move |_config| {
            let tx = tx.clone();
            async move {
                let _ = tx.send("create");
                Teardown::new(move || async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let _ = tx.send("destroyed");
                })
            }
        })
        .await
        .unwrap();

    storage.simulate_change();
    timeout(WAIT, handle.wait_for_generation(1)).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen, vec!["create", "destroyed", "create"]);
}

// =============================================================================
// Failure propagation
// =============================================================================

/// Backend whose reads can be switched to fail.
#[derive(Debug, Default)]
struct FlakyStorage {
    inner: MemoryStorage,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

#[async_trait]
impl StorageBackend for FlakyStorage {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get(&self) -> StoreResult<Option<Map<String, Value>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::backend("flaky", "read refused"));
        }
        self.inner.get().await
    }

    async fn set(&self, items: Map<String, Value>) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("flaky", "write refused"));
        }
        self.inner.set(items).await
    }

    fn on_changed(&self) -> ChangeListener {
        self.inner.on_changed()
    }
}

#[tokio::test]
async fn test_read_failure_propagates() {
    let storage = Arc::new(FlakyStorage::default());
    storage.fail_reads.store(true, Ordering::SeqCst);
    let store = ConfigStore::with_extension_defaults(storage.clone());

    assert!(matches!(
        store.read_config().await,
        Err(StoreError::Backend { .. })
    ));
    assert!(store.set_config("a", 1).await.is_err());
    assert!(
        store
            .configure(|_config| async { Teardown::noop() })
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_write_failure_propagates() {
    let storage = Arc::new(FlakyStorage::default());
    storage.fail_writes.store(true, Ordering::SeqCst);
    let store = ConfigStore::with_extension_defaults(storage.clone());

    let err = store.set_config("a", 1).await.unwrap_err();
    assert!(err.to_string().contains("write refused"));
    assert_eq!(
        Value::from(store.read_config().await.unwrap()),
        json!({"replaceWithLogo": true})
    );
}

#[tokio::test]
async fn test_failed_reread_leaves_handler_torn_down_until_next_change() {
    let storage = Arc::new(FlakyStorage::default());
    let store = ConfigStore::with_extension_defaults(storage.clone());
    let (mut handle, mut rx) = record_lifecycle(&store).await;
    next_event(&mut rx).await;

    storage.fail_reads.store(true, Ordering::SeqCst);
    storage.inner.simulate_change();
    assert_eq!(next_event(&mut rx).await, Event::Destroy(0));

    // Give the loop a moment; nothing else may happen while reads fail
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(handle.generation(), 0);

    storage.fail_reads.store(false, Ordering::SeqCst);
    storage.inner.simulate_change();
    assert_eq!(
        next_event(&mut rx).await,
        Event::Create(1, json!({"replaceWithLogo": true}))
    );
    assert_eq!(timeout(WAIT, handle.wait_for_generation(1)).await.unwrap(), Some(1));
}

// =============================================================================
// Backend selection
// =============================================================================

#[tokio::test]
async fn test_two_backends_present_first_is_used_consistently() {
    let first = Arc::new(MemoryStorage::named("first"));
    let second = Arc::new(MemoryStorage::named("second"));
    let candidates: [Option<Arc<dyn StorageBackend>>; 2] =
        [Some(first.clone()), Some(second.clone())];

    let store = ConfigStore::with_extension_defaults(select_backend(candidates).unwrap());
    assert_eq!(store.backend_name(), "first");

    store.set_config("a", 1).await.unwrap();
    store.set_config("b", 2).await.unwrap();
    store.read_config().await.unwrap();

    assert_eq!(store.backend_name(), "first");
    assert!(first.get().await.unwrap().is_some());
    assert_eq!(second.get().await.unwrap(), None);
}

#[tokio::test]
async fn test_change_notifier_closing_stops_rebuild_loop() {
    /// Backend whose notifier can be dropped.
    #[derive(Debug)]
    struct Closable {
        notifier: std::sync::Mutex<Option<ChangeNotifier>>,
    }

    #[async_trait]
    impl StorageBackend for Closable {
        fn name(&self) -> &str {
            "closable"
        }
        async fn get(&self) -> StoreResult<Option<Map<String, Value>>> {
            Ok(None)
        }
        async fn set(&self, _items: Map<String, Value>) -> StoreResult<()> {
            Ok(())
        }
        fn on_changed(&self) -> ChangeListener {
            self.notifier
                .lock()
                .unwrap()
                .as_ref()
                .expect("notifier present")
                .subscribe()
        }
    }

    let backend = Arc::new(Closable {
        notifier: std::sync::Mutex::new(Some(ChangeNotifier::new())),
    });
    let store = ConfigStore::with_extension_defaults(backend.clone());
    let mut handle = store
        .configure(|_config| async { Teardown::noop() })
        .await
        .unwrap();

    backend.notifier.lock().unwrap().take();
    assert_eq!(timeout(WAIT, handle.wait_for_rebuild()).await.unwrap(), None);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_active());
}
