//! In-process storage backend.
//!
//! Holds the object in memory for the life of the process. Every `set`
//! announces a change, matching how host storage reports writes made by
//! the extension itself.

use super::{ChangeListener, ChangeNotifier, StorageBackend};
use crate::error::StoreResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
pub struct MemoryStorage {
    name: String,
    items: Mutex<Option<Map<String, Value>>>,
    notifier: ChangeNotifier,
}

impl MemoryStorage {
    /// Create an empty store named `memory`.
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(None),
            notifier: ChangeNotifier::new(),
        }
    }

    /// Create a store that already holds `items`.
    pub fn with_items(items: Map<String, Value>) -> Self {
        Self {
            items: Mutex::new(Some(items)),
            ..Self::new()
        }
    }

    /// Announce a change without writing anything, as if another context
    /// had touched the store.
    pub fn simulate_change(&self) -> usize {
        self.notifier.notify()
    }

    /// Drop everything stored. Announces a change.
    pub async fn clear(&self) {
        *self.items.lock().await = None;
        self.notifier.notify();
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self) -> StoreResult<Option<Map<String, Value>>> {
        Ok(self.items.lock().await.clone())
    }

    async fn set(&self, items: Map<String, Value>) -> StoreResult<()> {
        {
            let mut guard = self.items.lock().await;
            let stored = guard.get_or_insert_with(Map::new);
            debug!(backend = %self.name, keys = items.len(), "Writing items");
            stored.extend(items);
        }
        self.notifier.notify();
        Ok(())
    }

    fn on_changed(&self) -> ChangeListener {
        self.notifier.subscribe()
    }
}
