//! Filesystem locations for storage and settings.
//!
//! - Storage: `<dir>/<namespace>.json`, where `dir` is explicit or the
//!   platform data directory (`~/.local/share/extension-config` on Linux).
//! - Settings: `<config dir>/extension-config/settings.yaml`.

use crate::error::{StoreError, StoreResult};
use std::path::{Path, PathBuf};

/// Directory name used under the platform data and config directories.
pub const APP_DIR_NAME: &str = "extension-config";

/// Settings file name inside the platform config directory.
pub const SETTINGS_FILE_NAME: &str = "settings.yaml";

/// Platform data directory for storage files, if the platform has one.
pub fn platform_storage_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Platform location of the settings file, if the platform has a config directory.
pub fn platform_settings_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Path of the JSON file holding `namespace` inside `dir`.
pub fn storage_file(dir: &Path, namespace: &str) -> PathBuf {
    dir.join(format!("{namespace}.json"))
}

/// Check that a namespace maps to exactly one plain file name.
pub fn validate_namespace(namespace: &str) -> StoreResult<()> {
    let valid = !namespace.is_empty()
        && !namespace.starts_with('.')
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidNamespace(namespace.to_string()))
    }
}
