//! Defaults-merged configuration store.
//!
//! [`ConfigStore`] reads and writes a configuration object through an
//! injected [`StorageBackend`], always presenting it merged over a fixed set
//! of defaults. [`ConfigStore::configure`] registers a create/destroy pair
//! that is torn down and rebuilt on every storage change event. There is no
//! diffing: the backend reports only that something changed, so the whole
//! handler is re-created from a fresh read.

use super::merge::overlay_defaults;
use super::types::Configuration;
use crate::error::StoreResult;
use crate::storage::StorageBackend;
use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type TeardownFn = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// One-shot cleanup returned by an `on_create` handler.
pub struct Teardown(TeardownFn);

impl Teardown {
    /// Wrap an async cleanup.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Box::new(move || Box::pin(f())))
    }

    /// Wrap a synchronous cleanup.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move || async move { f() })
    }

    /// A teardown that does nothing.
    pub fn noop() -> Self {
        Self::new(|| async {})
    }

    /// Run the cleanup, consuming it.
    pub async fn run(self) {
        (self.0)().await
    }
}

impl Default for Teardown {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Teardown")
    }
}

/// Configuration store over a storage backend.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    backend: Arc<dyn StorageBackend>,
    defaults: Arc<Configuration>,
}

impl ConfigStore {
    /// Create a store over `backend` with the given defaults.
    ///
    /// The backend is fixed for the life of the store.
    pub fn new(backend: Arc<dyn StorageBackend>, defaults: Configuration) -> Self {
        Self {
            backend,
            defaults: Arc::new(defaults),
        }
    }

    /// Create a store using [`Configuration::extension_defaults`].
    pub fn with_extension_defaults(backend: Arc<dyn StorageBackend>) -> Self {
        Self::new(backend, Configuration::extension_defaults())
    }

    pub fn defaults(&self) -> &Configuration {
        &self.defaults
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Read the stored configuration merged over the defaults.
    pub async fn read_config(&self) -> StoreResult<Configuration> {
        let stored = self.backend.get().await?;
        debug!(
            backend = %self.backend.name(),
            stored_keys = stored.as_ref().map_or(0, Map::len),
            "Read configuration"
        );
        Ok(overlay_defaults(&self.defaults, stored))
    }

    /// Set one key and persist the full merged configuration.
    ///
    /// This is a plain read-modify-write with no locking or versioning: two
    /// overlapping calls may each write a configuration that lacks the
    /// other's key, and the last write wins.
    pub async fn set_config(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> StoreResult<()> {
        let key = key.into();
        let mut config = self.read_config().await?;
        config.insert(key.clone(), value);
        self.backend.set(config.into_map()).await?;
        debug!(backend = %self.backend.name(), key = %key, "Configuration key set");
        Ok(())
    }

    /// Register a lifecycle handler.
    ///
    /// `on_create` is invoked once with the current configuration before this
    /// returns. Then, for every change reported by the backend, the previous
    /// [`Teardown`] is awaited and `on_create` is invoked again with a fresh
    /// read. Rebuilding continues in a background task for as long as the
    /// backend keeps its change stream open.
    ///
    /// The task holds its own clone of the store, and with it the backend.
    /// [`MemoryStorage`](crate::storage::MemoryStorage) and
    /// [`FileStorage`](crate::storage::FileStorage) own their notifier, so
    /// their change stream never closes and the task runs until the runtime
    /// shuts down.
    ///
    /// Fails only if the initial read fails. A failed re-read after a change
    /// is logged; the handler then stays torn down until the next change.
    pub async fn configure<F, Fut>(&self, mut on_create: F) -> StoreResult<ConfigureHandle>
    where
        F: FnMut(Configuration) -> Fut + Send + 'static,
        Fut: Future<Output = Teardown> + Send + 'static,
    {
        // Subscribe before the first read so no change can slip in between.
        let mut listener = self.backend.on_changed();

        let config = self.read_config().await?;
        let current = Arc::new(ArcSwap::from_pointee(config.clone()));
        let teardown = on_create(config).await;
        info!(backend = %self.backend.name(), "Configuration handler created");

        let (generation_tx, generation_rx) = watch::channel(0u64);
        let store = self.clone();
        let task_current = Arc::clone(&current);

        let task = tokio::spawn(async move {
            let mut teardown = Some(teardown);
            while listener.changed().await.is_some() {
                debug!(backend = %store.backend.name(), "Storage changed; rebuilding handler");
                if let Some(previous) = teardown.take() {
                    previous.run().await;
                }

                match store.read_config().await {
                    Ok(config) => {
                        task_current.store(Arc::new(config.clone()));
                        teardown = Some(on_create(config).await);
                        generation_tx.send_modify(|g| *g += 1);
                    }
                    Err(e) => {
                        error!(
                            backend = %store.backend.name(),
                            "Failed to re-read configuration after change: {}", e
                        );
                    }
                }
            }
            info!(backend = %store.backend.name(), "Storage change stream closed");
        });

        Ok(ConfigureHandle {
            current,
            generation: generation_rx,
            task,
        })
    }
}

/// Handle to an active configuration handler.
///
/// Dropping the handle does not stop rebuilding. Neither does dropping the
/// store or the caller's reference to the backend: the loop ends only when
/// the backend itself closes its change stream, which the built-in backends
/// never do.
#[derive(Debug)]
pub struct ConfigureHandle {
    current: Arc<ArcSwap<Configuration>>,
    generation: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl ConfigureHandle {
    /// The configuration most recently handed to `on_create`.
    pub fn current(&self) -> Arc<Configuration> {
        self.current.load_full()
    }

    /// Number of completed rebuilds since registration.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Wait for the next completed rebuild and return its generation.
    ///
    /// Returns `None` once the rebuild loop has stopped. Over a backend whose
    /// change stream stays open this simply waits for the next change.
    pub async fn wait_for_rebuild(&mut self) -> Option<u64> {
        self.generation.changed().await.ok()?;
        Some(*self.generation.borrow_and_update())
    }

    /// Wait until at least `generation` rebuilds have completed.
    pub async fn wait_for_generation(&mut self, generation: u64) -> Option<u64> {
        self.generation
            .wait_for(|g| *g >= generation)
            .await
            .ok()
            .map(|g| *g)
    }

    /// Whether the rebuild loop is still listening for changes.
    ///
    /// Stays `true` for the built-in backends.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}
