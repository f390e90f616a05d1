//! JSON-file storage backend.
//!
//! Each namespace is one pretty-printed JSON object at `<dir>/<namespace>.json`.
//! Writes go to a uniquely named sibling temp file that is then renamed over
//! the target, so readers never observe a half-written document.

use super::watcher::{WatchGuard, WatcherConfig, start_storage_watcher};
use super::{ChangeListener, ChangeNotifier, StorageBackend};
use crate::error::{StoreError, StoreResult};
use crate::paths;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

#[derive(Debug)]
pub struct FileStorage {
    name: String,
    path: PathBuf,
    notifier: ChangeNotifier,
    /// Number of live watch guards.
    watchers: Arc<AtomicUsize>,
}

impl FileStorage {
    /// Open the file backend for `namespace` inside `dir`.
    ///
    /// Nothing is created on disk until the first write.
    pub fn open(dir: impl AsRef<Path>, namespace: &str) -> StoreResult<Self> {
        paths::validate_namespace(namespace)?;
        let path = paths::storage_file(dir.as_ref(), namespace);
        Ok(Self {
            name: format!("file:{}", path.display()),
            path,
            notifier: ChangeNotifier::new(),
            watchers: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Report edits made by other processes as change events.
    ///
    /// While the returned guard is alive, this backend's own writes are also
    /// reported through the watcher rather than directly, so each write is
    /// announced once. Creates the storage directory if needed.
    ///
    /// Synchronous: the directory is created with blocking I/O, once, before
    /// the watcher starts. Call it during setup rather than from a hot path.
    pub fn watch_external(&self, config: &WatcherConfig) -> StoreResult<WatchGuard> {
        let dir = self.storage_dir();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        start_storage_watcher(
            &self.path,
            config,
            self.notifier.clone(),
            Arc::clone(&self.watchers),
        )
    }

    pub fn is_watching(&self) -> bool {
        self.watchers.load(Ordering::SeqCst) > 0
    }

    async fn read_object(&self) -> StoreResult<Option<Map<String, Value>>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        match value {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(StoreError::NotAnObject {
                path: self.path.clone(),
            }),
        }
    }

    async fn write_object(&self, object: &Map<String, Value>) -> StoreResult<()> {
        let dir = self.storage_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        let mut content =
            serde_json::to_string_pretty(object).map_err(|source| StoreError::Encode {
                path: self.path.clone(),
                source,
            })?;
        content.push('\n');

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&dir, &path, content.as_bytes()))
            .await
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(e),
            })?
    }

    fn storage_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Write `content` to a uniquely named temp file in `dir`, then rename it
/// over `path`.
///
/// Every write gets its own temp file, so overlapping writers (tasks or
/// processes) never rename each other's file away. The last rename wins.
fn replace_file(dir: &Path, path: &Path, content: &[u8]) -> StoreResult<()> {
    let prefix = match path.file_name() {
        Some(name) => format!(".{}.", name.to_string_lossy()),
        None => ".".to_string(),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    let tmp_path = tmp.path().to_path_buf();
    tmp.write_all(content)
        .map_err(|source| StoreError::Io {
            path: tmp_path,
            source,
        })?;
    tmp.persist(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[async_trait]
impl StorageBackend for FileStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self) -> StoreResult<Option<Map<String, Value>>> {
        self.read_object().await
    }

    async fn set(&self, items: Map<String, Value>) -> StoreResult<()> {
        let mut object = self.read_object().await?.unwrap_or_default();
        debug!(path = %self.path.display(), keys = items.len(), "Writing items");
        object.extend(items);
        self.write_object(&object).await?;

        if !self.is_watching() {
            self.notifier.notify();
        }
        Ok(())
    }

    fn on_changed(&self) -> ChangeListener {
        self.notifier.subscribe()
    }
}
