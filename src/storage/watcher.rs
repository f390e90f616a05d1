//! File watcher for file-backed storage.
//!
//! Watches the directory holding a namespace file and turns any change to
//! that file, whether written by this process or another one, into a change
//! announcement. Uses debouncing to coalesce rapid writes.

use super::ChangeNotifier;
use crate::error::{StoreError, StoreResult};
use notify::RecommendedWatcher;
use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, Debouncer, new_debouncer};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Configuration for the storage watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for coalescing rapid changes.
    pub debounce_duration: Duration,
}

impl WatcherConfig {
    pub fn with_debounce_ms(ms: u64) -> Self {
        Self {
            debounce_duration: Duration::from_millis(ms),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::with_debounce_ms(500)
    }
}

/// Keeps a storage watcher alive. Dropping it stops watching.
pub struct WatchGuard {
    _debouncer: Debouncer<RecommendedWatcher>,
    active: Arc<AtomicUsize>,
    path: PathBuf,
}

impl WatchGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchGuard").field("path", &self.path).finish()
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        info!("Stopped watching storage file: {}", self.path.display());
    }
}

/// Starts watching `file` for changes.
///
/// Must be called from within a tokio runtime. `active` is incremented while
/// the returned guard is alive so the owning backend can tell that its own
/// writes will be reported by the watcher.
pub(crate) fn start_storage_watcher(
    file: &Path,
    config: &WatcherConfig,
    notifier: ChangeNotifier,
    active: Arc<AtomicUsize>,
) -> StoreResult<WatchGuard> {
    let dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file_name = file
        .file_name()
        .map(OsStr::to_os_string)
        .unwrap_or_default();

    let (notify_tx, notify_rx) = mpsc::channel();

    let mut debouncer =
        new_debouncer(config.debounce_duration, notify_tx).map_err(|source| StoreError::Watch {
            path: dir.clone(),
            source,
        })?;
    debouncer
        .watcher()
        .watch(&dir, notify::RecursiveMode::NonRecursive)
        .map_err(|source| StoreError::Watch {
            path: dir.clone(),
            source,
        })?;
    info!("Watching storage file: {}", file.display());

    // Exits once the debouncer (and with it the sending half) is dropped.
    tokio::task::spawn_blocking(move || forward_events(notify_rx, notifier, file_name));

    active.fetch_add(1, Ordering::SeqCst);
    Ok(WatchGuard {
        _debouncer: debouncer,
        active,
        path: file.to_path_buf(),
    })
}

/// Forward debounced events that touch the watched file.
fn forward_events(
    rx: mpsc::Receiver<Result<Vec<DebouncedEvent>, notify::Error>>,
    notifier: ChangeNotifier,
    file_name: OsString,
) {
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let touched = events.iter().any(|event| {
                    matches!(
                        event.kind,
                        DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
                    ) && is_watched_file(&event.path, &file_name)
                });
                if touched {
                    let reached = notifier.notify();
                    debug!(listeners = reached, "Storage file changed on disk");
                }
            }
            Ok(Err(e)) => {
                error!("Storage watcher error: {}", e);
            }
            Err(_) => {
                info!("Storage watcher channel closed, stopping");
                return;
            }
        }
    }
}

fn is_watched_file(path: &Path, file_name: &OsStr) -> bool {
    path.file_name() == Some(file_name)
}
