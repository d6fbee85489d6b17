//! Layered configuration composition.
//!
//! # Precedence
//! ```text
//! built-in defaults  <  file section  <  environment (<SECTION>_<KEY>)
//! ```
//!
//! # Coercion
//! Environment values are strings. They take the type of the built-in default
//! for the key, or of the file value when there is no default. Keys that only
//! exist in the environment stay strings. A value that cannot be coerced is
//! dropped with a warning and the lower layer wins.
//!
//! # Shadowing
//! Section prefixes can nest: `AUTH_` is a prefix of `AUTH_SERVICE_`. A
//! variable belongs to the longest known section whose prefix it carries, so
//! `AUTH_SERVICE_JWT_SECRET` reaches `auth_service` and never `auth`.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::config::env::{env_prefix, EnvSnapshot};

/// An environment value that does not fit the type of its key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot read {raw:?} as {expected}")]
pub struct CoercionError {
    raw: String,
    expected: &'static str,
}

impl CoercionError {
    fn new(raw: &str, expected: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
            expected,
        }
    }
}

/// Parse a boolean the way environment flags are usually written.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Coerce an environment string to the type of `like`.
pub fn coerce(raw: &str, like: Option<&Value>) -> Result<Value, CoercionError> {
    match like {
        Some(Value::Bool(_)) => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| CoercionError::new(raw, "boolean")),
        Some(Value::Number(n)) if n.is_f64() => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| CoercionError::new(raw, "float")),
        Some(Value::Number(_)) => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| CoercionError::new(raw, "integer")),
        Some(Value::Array(_)) => serde_json::from_str::<Value>(raw)
            .ok()
            .filter(Value::is_array)
            .ok_or_else(|| CoercionError::new(raw, "JSON array")),
        Some(Value::Object(_)) => serde_json::from_str::<Value>(raw)
            .ok()
            .filter(Value::is_object)
            .ok_or_else(|| CoercionError::new(raw, "JSON object")),
        Some(Value::String(_)) | Some(Value::Null) | None => Ok(Value::String(raw.to_string())),
    }
}

/// Compose one section from its three layers.
pub fn compose_section(
    section: &str,
    defaults: &Map<String, Value>,
    file: Option<&Map<String, Value>>,
    env: &EnvSnapshot,
) -> BTreeMap<String, Value> {
    compose_section_among(section, &[], defaults, file, env)
}

/// Compose `section` when `sections` are also known.
///
/// Variables carrying the prefix of a longer known section that extends
/// `section` are left to that section.
pub fn compose_section_among(
    section: &str,
    sections: &[String],
    defaults: &Map<String, Value>,
    file: Option<&Map<String, Value>>,
    env: &EnvSnapshot,
) -> BTreeMap<String, Value> {
    let mut composed: BTreeMap<String, Value> = defaults
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if let Some(file) = file {
        for (key, value) in file {
            composed.insert(key.clone(), value.clone());
        }
    }

    let prefix = env_prefix(section);
    let shadowing: Vec<String> = sections
        .iter()
        .map(|other| env_prefix(other))
        .filter(|other| other.len() > prefix.len() && other.starts_with(&prefix))
        .collect();

    let owned = env.iter().filter(|(name, _)| {
        name.starts_with(&prefix) && !shadowing.iter().any(|longer| name.starts_with(longer.as_str()))
    });
    for (name, raw) in owned {
        let suffix = &name[prefix.len()..];
        if suffix.is_empty() {
            continue;
        }

        // Existing keys match case-insensitively so `fooBar` can be set by `SVC_FOOBAR`.
        let key = composed
            .keys()
            .find(|k| k.to_uppercase() == suffix)
            .cloned()
            .unwrap_or_else(|| suffix.to_lowercase());

        let like = defaults
            .get(&key)
            .or_else(|| file.and_then(|f| f.get(&key)));

        match coerce(raw, like) {
            Ok(value) => {
                tracing::debug!(section, key = %key, var = %name, "Environment override applied");
                composed.insert(key, value);
            }
            Err(e) => {
                tracing::warn!(
                    section,
                    key = %key,
                    var = %name,
                    error = %e,
                    "Ignoring environment override"
                );
            }
        }
    }

    composed
}
