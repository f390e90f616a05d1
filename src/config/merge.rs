//! Merging of defaults, stored values and settings tiers.
//!
//! Two strategies live here:
//! - [`overlay_defaults`]: shallow, used for stored configuration. A stored key
//!   replaces the default value wholesale, `null` included.
//! - [`deep_merge`]: field-by-field, used for the tool's own settings tiers.
//!   Arrays are replaced entirely, not concatenated.

use super::types::Configuration;
use serde_json::{Map, Value};

/// Overlay stored values on top of `defaults`.
///
/// Every default key is present in the result; stored keys win; keys that
/// exist only in storage are kept. `None` (nothing stored yet) yields the
/// defaults unchanged.
pub fn overlay_defaults(
    defaults: &Configuration,
    stored: Option<Map<String, Value>>,
) -> Configuration {
    let mut merged = defaults.as_map().clone();
    if let Some(stored) = stored {
        merged.extend(stored);
    }
    Configuration::from(merged)
}

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans, nulls are replaced entirely
/// - If overlay is null, the base value is preserved (null means "not specified")
///
/// # Example
/// ```
/// use serde_json::json;
/// use extension_config::config::deep_merge;
///
/// let base = json!({
///     "storage": { "namespace": "config", "dir": null },
///     "watch": { "debounce_ms": 500 }
/// });
/// let overlay = json!({
///     "storage": { "dir": "/tmp/ext" }
/// });
/// let result = deep_merge(base, overlay);
/// assert_eq!(result["storage"]["namespace"], "config");
/// assert_eq!(result["storage"]["dir"], "/tmp/ext");
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        // Both are objects: merge recursively
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = if let Some(base_value) = base_map.remove(&key) {
                    deep_merge(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        // Overlay is null: preserve base (null means "not specified")
        (base, Value::Null) => base,
        // Any other case: overlay replaces base entirely
        (_, overlay) => overlay,
    }
}

/// Merge multiple values in order, with later values taking precedence.
///
/// Equivalent to folding `deep_merge` over the list.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}
