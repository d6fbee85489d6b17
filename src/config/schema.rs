//! Configuration schema definitions.
//!
//! The configuration file is TOML with three top-level sections:
//!
//! ```toml
//! [gateway]
//! port = 8000
//! debug = true
//!
//! [services.user_service]
//! database_url = "postgresql://localhost/users"
//!
//! [[mounts]]
//! service_name = "user_service"
//! module_path = "services/users.toml"
//! exclude_endpoints = ["/admin"]
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Gateway-wide settings.
///
/// Every field has a built-in default; the defaults also decide how
/// `GATEWAY_*` environment overrides are coerced.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listen host.
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Permissive mode. Enables the reload endpoints.
    pub debug: bool,

    pub title: String,

    pub version: String,

    pub description: String,

    /// Bearer token required by management endpoints, when set.
    #[serde(serialize_with = "redact")]
    pub admin_token: Option<String>,

    /// Upper bound for a single module resolution.
    pub resolve_timeout_ms: u64,

    /// Upper bound for a single HTTP request.
    pub request_timeout_secs: u64,

    /// Prometheus listener address. Metrics are disabled when unset.
    pub metrics_address: Option<String>,

    /// Reload the configuration when the file changes.
    pub watch_config: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: false,
            title: "Dynamic API Gateway".to_string(),
            version: "1.0.0".to_string(),
            description: "Gateway composing independently developed services".to_string(),
            admin_token: None,
            resolve_timeout_ms: 5_000,
            request_timeout_secs: 30,
            metrics_address: None,
            watch_config: false,
        }
    }
}

impl GatewayConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn redact<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_some("********"),
        None => serializer.serialize_none(),
    }
}

/// Composed key/value configuration of one service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ServiceConfig(BTreeMap<String, Value>);

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }
}

impl From<BTreeMap<String, Value>> for ServiceConfig {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for ServiceConfig {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One `[[mounts]]` entry: how to locate and expose a service.
///
/// Unknown keys are rejected so a misspelled filter cannot silently expose
/// every endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    /// Unique service identifier.
    pub service_name: String,

    /// Registered module key or route manifest path.
    pub module_path: String,

    /// Exported symbol holding the routes (default: `router`).
    pub router_symbol_name: Option<String>,

    /// Mount prefix (default: `/<service_name>`).
    pub url_prefix: Option<String>,

    /// Labels used in listings (default: the title-cased service name).
    pub tags: Option<Vec<String>>,

    /// Only expose these endpoints.
    pub include_endpoints: Option<BTreeSet<String>>,

    /// Expose everything but these endpoints.
    pub exclude_endpoints: Option<BTreeSet<String>>,

    /// `[services.<name>]` section to use (default: the service name).
    pub config_section_name: Option<String>,
}

impl MountConfig {
    pub fn new(service_name: impl Into<String>, module_path: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            module_path: module_path.into(),
            router_symbol_name: None,
            url_prefix: None,
            tags: None,
            include_endpoints: None,
            exclude_endpoints: None,
            config_section_name: None,
        }
    }
}

/// Raw contents of the configuration file, before composition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub gateway: toml::Table,
    pub services: BTreeMap<String, toml::Table>,
    pub mounts: Vec<MountConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert!(!config.debug);
        assert_eq!(config.title, "Dynamic API Gateway");
        assert_eq!(config.resolve_timeout_ms, 5_000);
    }

    #[test]
    fn test_admin_token_is_redacted() {
        let config = GatewayConfig {
            admin_token: Some("s3cret".into()),
            ..GatewayConfig::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["admin_token"], "********");
        assert!(!json.to_string().contains("s3cret"));
    }

    #[test]
    fn test_config_file_sections() {
        let file: ConfigFile = toml::from_str(
            r#"
            [gateway]
            port = 9000

            [services.user_service]
            cache_ttl = 600

            [[mounts]]
            service_name = "user_service"
            module_path = "users.toml"
            exclude_endpoints = ["/admin"]
            "#,
        )
        .unwrap();

        assert_eq!(file.gateway["port"].as_integer(), Some(9000));
        assert_eq!(file.services["user_service"]["cache_ttl"].as_integer(), Some(600));
        assert_eq!(file.mounts.len(), 1);
        assert!(file.mounts[0].url_prefix.is_none());
        assert!(file.mounts[0].exclude_endpoints.as_ref().unwrap().contains("/admin"));
    }

    #[test]
    fn test_service_config_accessors() {
        let config = ServiceConfig::new()
            .with("database_url", "postgres://localhost")
            .with("cache_ttl", 300)
            .with("enabled", true);

        assert_eq!(config.get_str("database_url"), Some("postgres://localhost"));
        assert_eq!(config.get_i64("cache_ttl"), Some(300));
        assert_eq!(config.get_bool("enabled"), Some(true));
        assert_eq!(config.len(), 3);
    }
}
