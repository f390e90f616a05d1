//! Storage backends for persisted configuration.
//!
//! A backend is a namespaced key-value object with three capabilities:
//! read the whole object, merge keys into it, and announce that it changed.
//! Change announcements carry no payload; consumers re-read the full state.

pub mod file;
pub mod memory;
pub mod watcher;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

/// Buffered change events per listener before it is considered lagging.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A persistent key-value store with change notifications.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Read the stored object. `Ok(None)` means nothing has been stored yet.
    async fn get(&self) -> StoreResult<Option<Map<String, Value>>>;

    /// Merge `items` into the stored object. Keys not present in `items`
    /// are left untouched.
    async fn set(&self, items: Map<String, Value>) -> StoreResult<()>;

    /// Subscribe to change announcements.
    fn on_changed(&self) -> ChangeListener;
}

/// Sending half of a payload-less change broadcast.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<()>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Announce a change. Returns how many listeners were reached.
    pub fn notify(&self) -> usize {
        // No listeners is not an error: nobody has called configure yet.
        self.tx.send(()).unwrap_or(0)
    }

    pub fn subscribe(&self) -> ChangeListener {
        ChangeListener {
            rx: self.tx.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a change broadcast.
#[derive(Debug)]
pub struct ChangeListener {
    rx: broadcast::Receiver<()>,
}

impl ChangeListener {
    /// Wait for the next change.
    ///
    /// Returns `None` once every notifier has been dropped. If this listener
    /// fell behind, the missed events are reported as a single change.
    pub async fn changed(&mut self) -> Option<()> {
        match self.rx.recv().await {
            Ok(()) => Some(()),
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Change listener lagged; coalescing missed events");
                Some(())
            }
            Err(RecvError::Closed) => None,
        }
    }
}

/// Pick the first available backend in priority order.
///
/// Candidates are `None` when the corresponding backend is not present in
/// this environment.
pub fn select_backend<B, I>(candidates: I) -> StoreResult<Arc<B>>
where
    B: ?Sized,
    I: IntoIterator<Item = Option<Arc<B>>>,
{
    candidates
        .into_iter()
        .flatten()
        .next()
        .ok_or(StoreError::NoBackend)
}
