//! Output formatting for configurations and values.

use crate::config::Configuration;
use anyhow::Result;
use clap::ValueEnum;
use serde_json::Value;

/// Output format for printed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    /// One `key = value` line per entry.
    Text,
}

/// Render a whole configuration.
pub fn render_configuration(config: &Configuration, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(config)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(config)?.trim_end().to_string()),
        OutputFormat::Text => Ok(config
            .iter()
            .map(|(key, value)| format!("{} = {}", key, render_scalar(value)))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

/// Render a single value.
pub fn render_value(value: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?.trim_end().to_string()),
        OutputFormat::Text => Ok(render_scalar(value)),
    }
}

/// Strings print bare; everything else prints as compact JSON.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a value given on the command line.
///
/// JSON literals (`true`, `42`, `"quoted"`, `[1,2]`) are parsed as JSON;
/// anything else is taken as a plain string.
pub fn parse_cli_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
