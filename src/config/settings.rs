//! Settings for the command-line tool.
//!
//! Loaded from three tiers and merged field-by-field:
//! 1. **Built-in** - `Settings::default()`
//! 2. **File** - YAML settings file
//! 3. **Environment** - `EXTENSION_CONFIG_DIR`, `EXTENSION_CONFIG_NAMESPACE`
//!
//! Command-line flags are applied by the caller on top of the result.

use super::merge::{deep_merge_all, overlay_defaults};
use super::types::Configuration;
use crate::paths;
use crate::storage::watcher::WatcherConfig;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Explicit settings file (overrides discovery).
pub const SETTINGS_FILE_ENV: &str = "EXTENSION_CONFIG_SETTINGS";
/// Storage directory override.
pub const STORAGE_DIR_ENV: &str = "EXTENSION_CONFIG_DIR";
/// Storage namespace override.
pub const NAMESPACE_ENV: &str = "EXTENSION_CONFIG_NAMESPACE";

/// Tool settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub watch: WatchSettings,

    /// Values overlaid on the built-in defaults.
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

/// Where configuration is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Explicit storage directory. Preferred over the platform data directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Namespace; the file is `<dir>/<namespace>.json`.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dir: None,
            namespace: default_namespace(),
        }
    }
}

/// Watching for edits made outside this process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Watch the storage file while a handler is active (default: true).
    #[serde(default = "default_true")]
    pub external: bool,

    /// Debounce window in milliseconds (default: 500).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            external: default_true(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl WatchSettings {
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig::with_debounce_ms(self.debounce_ms)
    }
}

fn default_namespace() -> String {
    "config".to_string()
}
fn default_true() -> bool {
    true
}
fn default_debounce_ms() -> u64 {
    500
}

impl Settings {
    /// Built-in extension defaults overlaid with the `defaults` section.
    pub fn store_defaults(&self) -> Configuration {
        overlay_defaults(
            &Configuration::extension_defaults(),
            Some(self.defaults.clone()),
        )
    }

    /// Storage directory candidates in priority order.
    ///
    /// The explicit directory comes first, then the platform data directory.
    /// Either may be absent.
    pub fn storage_dir_candidates(&self) -> [Option<PathBuf>; 2] {
        [self.storage.dir.clone(), paths::platform_storage_dir()]
    }
}

/// Loads [`Settings`] from the built-in, file and environment tiers.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    settings: Settings,
    source: Option<PathBuf>,
}

impl SettingsLoader {
    /// Load settings, discovering the settings file.
    ///
    /// Order: `explicit`, then `EXTENSION_CONFIG_SETTINGS`, then the platform
    /// settings file if it exists. An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(SETTINGS_FILE_ENV).map(PathBuf::from);
        let file = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Some(path),
            None => paths::platform_settings_file().filter(|p| p.exists()),
        };
        Self::load_with(file.as_deref(), env_overrides()?)
    }

    /// Load from an optional settings file plus an environment tier given as
    /// a JSON object.
    pub fn load_with(file: Option<&Path>, env_tier: Value) -> Result<Self> {
        let builtin = serde_json::to_value(Settings::default())?;

        let file_tier = match file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading settings file {}", path.display()))?;
                let value: Value = serde_yaml::from_str(&content)
                    .with_context(|| format!("parsing settings file {}", path.display()))?;
                debug!("Loaded settings from {}", path.display());
                value
            }
            None => Value::Null,
        };

        let merged = deep_merge_all([builtin, file_tier, env_tier]);
        let settings: Settings =
            serde_json::from_value(merged).context("invalid settings")?;

        Ok(Self {
            settings,
            source: file.map(Path::to_path_buf),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// The settings file that was read, if any.
    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/// Environment tier as a partial settings object.
fn env_overrides() -> Result<Value> {
    env_tier(
        std::env::var_os(STORAGE_DIR_ENV),
        std::env::var_os(NAMESPACE_ENV),
    )
}

/// Build the environment tier from raw variable values.
///
/// Values that are not valid UTF-8 are rejected rather than guessed at.
fn env_tier(dir: Option<OsString>, namespace: Option<OsString>) -> Result<Value> {
    let mut storage = Map::new();
    if let Some(dir) = dir {
        let dir = utf8_var(STORAGE_DIR_ENV, dir)?;
        storage.insert("dir".into(), Value::String(dir));
    }
    if let Some(namespace) = namespace {
        let namespace = utf8_var(NAMESPACE_ENV, namespace)?;
        storage.insert("namespace".into(), Value::String(namespace));
    }
    if storage.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(json!({ "storage": storage }))
    }
}

fn utf8_var(name: &str, value: OsString) -> Result<String> {
    value
        .into_string()
        .map_err(|raw| anyhow!("{} is not valid UTF-8: {}", name, raw.to_string_lossy()))
}
