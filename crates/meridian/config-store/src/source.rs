//! Property file parsing
//!
//! YAML trees are flattened to dotted keys (`server.port`) with sequence
//! items as `key[i]`. `.properties` files keep every value as a string.

use crate::error::{ConfigStoreError, Result};
use serde::Deserialize;
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// File extensions understood by [`parse_source`]
pub const EXTENSIONS: [&str; 3] = ["yaml", "yml", "properties"];

/// Parse a property file, dispatching on its extension
pub fn parse_source(path: &str, contents: &str) -> Result<BTreeMap<String, Value>> {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("yml") | Some("yaml") => parse_yaml(path, contents),
        Some("properties") => Ok(parse_properties(contents)),
        _ => Err(ConfigStoreError::Parse {
            path: path.to_string(),
            message: "unsupported file type".into(),
        }),
    }
}

/// Parse and flatten a YAML file; later documents in a multi-document
/// file override earlier ones
pub fn parse_yaml(path: &str, contents: &str) -> Result<BTreeMap<String, Value>> {
    let mut properties = BTreeMap::new();

    for document in serde_yaml::Deserializer::from_str(contents) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| {
            ConfigStoreError::Parse {
                path: path.to_string(),
                message: e.to_string(),
            }
        })?;
        flatten(None, &value, &mut properties);
    }

    Ok(properties)
}

fn flatten(prefix: Option<&str>, value: &serde_yaml::Value, out: &mut BTreeMap<String, Value>) {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Mapping(map) => {
            for (key, child) in map {
                let Some(key) = scalar_key(key) else {
                    continue;
                };
                let path = match prefix {
                    Some(prefix) => format!("{}.{}", prefix, key),
                    None => key,
                };
                flatten(Some(&path), child, out);
            }
        }
        Yaml::Sequence(items) => {
            let prefix = prefix.unwrap_or_default();
            for (i, child) in items.iter().enumerate() {
                flatten(Some(&format!("{}[{}]", prefix, i)), child, out);
            }
        }
        Yaml::Tagged(tagged) => flatten(prefix, &tagged.value, out),
        scalar => {
            // An empty document flattens to nothing.
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), scalar_value(scalar));
            }
        }
    }
}

fn scalar_key(key: &serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_value(value: &serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(n.to_string()))
            }
        }
        Yaml::String(s) => Value::String(s.clone()),
        other => Value::String(format!("{:?}", other)),
    }
}

/// Parse a `.properties` file.
///
/// Supports `key=value`, `key: value`, `#`/`!` comments and trailing
/// backslash continuation lines.
pub fn parse_properties(contents: &str) -> BTreeMap<String, Value> {
    let mut properties = BTreeMap::new();
    let mut logical = String::new();

    for raw in contents.lines() {
        let line = raw.trim_start();
        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        if let Some(continued) = line.strip_suffix('\\') {
            logical.push_str(continued);
            continue;
        }
        logical.push_str(line);

        if let Some((key, value)) = split_entry(&logical) {
            properties.insert(key, Value::String(value));
        }
        logical.clear();
    }

    if !logical.is_empty() {
        if let Some((key, value)) = split_entry(&logical) {
            properties.insert(key, Value::String(value));
        }
    }

    properties
}

fn split_entry(line: &str) -> Option<(String, String)> {
    let separator = line.find(['=', ':'])?;
    let key = line[..separator].trim();
    if key.is_empty() {
        return None;
    }
    let value = line[separator + 1..].trim_start();
    Some((key.to_string(), value.to_string()))
}
