//! Configuration loading and argument parsing shared by the commands.

use esorm_gateway::{EsConfig, FilterTerm};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Connection settings given on the command line; they win over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    /// `es.url`
    pub url: Option<String>,
    /// `es.username`
    pub username: Option<String>,
    /// `es.password`
    pub password: Option<String>,
}

/// Builds the configuration from defaults, the properties file and the
/// command-line overrides, in that order.
pub fn load(
    path: Option<&Path>,
    overrides: &Overrides,
) -> Result<EsConfig, Box<dyn std::error::Error>> {
    let mut props = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            parse_properties(&text)
        }
        None => HashMap::new(),
    };
    for (key, value) in [
        ("es.url", &overrides.url),
        ("es.username", &overrides.username),
        ("es.password", &overrides.password),
    ] {
        if let Some(value) = value {
            props.insert(key.to_string(), value.clone());
        }
    }

    let mut config = EsConfig::default();
    config.configure(|key, set| {
        if let Some(value) = props.get(key) {
            set(value.as_str());
        }
    });
    Ok(config)
}

/// Parses `key=value` lines. Blank lines and lines starting with `#` or
/// `;` are ignored; keys and values are trimmed.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with(';'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Parses `key=value` filter arguments. Values that read as JSON scalars
/// (numbers, booleans) keep their type; anything else is a string.
pub fn parse_filters(filters: &[String]) -> Result<Vec<FilterTerm>, String> {
    filters
        .iter()
        .map(|filter| {
            let (key, value) = filter
                .split_once('=')
                .ok_or_else(|| format!("filter `{filter}` is not key=value"))?;
            let value = match serde_json::from_str::<Value>(value) {
                Ok(parsed @ (Value::Number(_) | Value::Bool(_))) => parsed,
                _ => Value::String(value.to_string()),
            };
            Ok(FilterTerm::parse(key.trim(), value))
        })
        .collect()
}
