//! Configuration store and the tool's own settings.
//!
//! - [`ConfigStore`]: reads and writes an open key-value [`Configuration`]
//!   through a storage backend, merged over explicit defaults, and rebuilds a
//!   registered handler on every storage change.
//! - [`Settings`]: where the command-line tool keeps its store and which
//!   defaults it uses, loaded from built-in, file and environment tiers.
//!
//! ## Environment Variables
//! - `EXTENSION_CONFIG_SETTINGS` - Explicit settings file
//! - `EXTENSION_CONFIG_DIR` - Storage directory
//! - `EXTENSION_CONFIG_NAMESPACE` - Storage namespace

mod merge;
mod settings;
mod store;
mod types;

pub use merge::{deep_merge, deep_merge_all, overlay_defaults};
pub use settings::{
    NAMESPACE_ENV, SETTINGS_FILE_ENV, STORAGE_DIR_ENV, Settings, SettingsLoader, StorageSettings,
    WatchSettings,
};
pub use store::{ConfigStore, ConfigureHandle, Teardown};
pub use types::{Configuration, keys};
