//! Structured error types for storage and store operations.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Storage access
    StorageIo,
    StorageCorrupt,
    StorageEncode,
    BackendFailure,

    // Setup
    NoBackend,
    InvalidNamespace,
    WatchFailed,
}

/// Errors produced by storage backends and the config store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing storage at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored document could not be parsed as JSON.
    #[error("stored data at {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A configuration object could not be encoded for writing.
    #[error("failed to encode configuration for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The stored document parsed, but its top level is not an object.
    #[error("stored data at {path} is not a JSON object")]
    NotAnObject { path: PathBuf },

    /// None of the candidate backends was available.
    #[error("no storage backend available")]
    NoBackend,

    /// Namespace would not map to a single file name.
    #[error("invalid storage namespace '{0}': use letters, digits, '-', '_' or '.'")]
    InvalidNamespace(String),

    /// The filesystem watcher could not be started.
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// Catch-all for backends that are not file based.
    #[error("storage backend '{backend}' failed: {message}")]
    Backend { backend: String, message: String },
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::Io { .. } => ErrorCode::StorageIo,
            StoreError::Parse { .. } | StoreError::NotAnObject { .. } => {
                ErrorCode::StorageCorrupt
            }
            StoreError::Encode { .. } => ErrorCode::StorageEncode,
            StoreError::NoBackend => ErrorCode::NoBackend,
            StoreError::InvalidNamespace(_) => ErrorCode::InvalidNamespace,
            StoreError::Watch { .. } => ErrorCode::WatchFailed,
            StoreError::Backend { .. } => ErrorCode::BackendFailure,
        }
    }

    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Serializable error report, as printed by the CLI in JSON mode.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&StoreError> for ErrorReport {
    fn from(err: &StoreError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
