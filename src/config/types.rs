//! Configuration value types.
//!
//! A [`Configuration`] is an open key-value object. The extension recognises
//! a handful of keys (see [`keys`]) but any key may be stored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys the extension itself reads.
pub mod keys {
    /// Replace matched images with the logo instead of hiding them.
    pub const REPLACE_WITH_LOGO: &str = "replaceWithLogo";
}

/// A key-value settings object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(Map<String, Value>);

impl Configuration {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// The extension's built-in defaults: `{ "replaceWithLogo": true }`.
    pub fn extension_defaults() -> Self {
        let mut config = Self::new();
        config.insert(keys::REPLACE_WITH_LOGO, true);
        config
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a boolean value. Returns `None` if missing or not a boolean.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Set `key` to `value`, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Whether the logo replacement is enabled, falling back to the built-in default.
    pub fn replace_with_logo(&self) -> bool {
        self.get_bool(keys::REPLACE_WITH_LOGO).unwrap_or(true)
    }
}

impl From<Map<String, Value>> for Configuration {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Configuration> for Value {
    fn from(config: Configuration) -> Self {
        Value::Object(config.0)
    }
}

impl TryFrom<Value> for Configuration {
    type Error = Value;

    /// Accepts only JSON objects; anything else is handed back unchanged.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extension_defaults() {
        let defaults = Configuration::extension_defaults();
        assert_eq!(Value::from(defaults.clone()), json!({"replaceWithLogo": true}));
        assert!(defaults.replace_with_logo());
    }

    #[test]
    fn test_typed_getters() {
        let config: Configuration = [
            ("flag", json!(false)),
            ("name", json!("x")),
            ("ratio", json!(0.5)),
        ]
        .into_iter()
        .collect();

        assert_eq!(config.get_bool("flag"), Some(false));
        assert_eq!(config.get_str("name"), Some("x"));
        assert_eq!(config.get_f64("ratio"), Some(0.5));
        assert_eq!(config.get_bool("name"), None);
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn test_replace_with_logo_ignores_wrong_type() {
        let mut config = Configuration::new();
        config.insert(keys::REPLACE_WITH_LOGO, "no");
        assert!(config.replace_with_logo());
        config.insert(keys::REPLACE_WITH_LOGO, false);
        assert!(!config.replace_with_logo());
    }

    #[test]
    fn test_try_from_rejects_non_object() {
        assert!(Configuration::try_from(json!([1, 2])).is_err());
        let config = Configuration::try_from(json!({"a": 1})).unwrap();
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let config = Configuration::extension_defaults();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"replaceWithLogo":true}"#);
        let parsed: Configuration = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
