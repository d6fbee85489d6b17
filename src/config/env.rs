//! Environment variable sources.
//!
//! Composition reads a snapshot of the environment once per load, so a
//! composed configuration never changes underneath its readers. Tests pass a
//! plain map instead of touching the process environment.

use std::collections::{BTreeMap, HashMap};

/// Point-in-time copy of environment variables.
pub type EnvSnapshot = BTreeMap<String, String>;

/// Source of environment variables.
pub trait EnvSource: Send + Sync {
    fn snapshot(&self) -> EnvSnapshot;
}

/// The real process environment. Variables that are not valid UTF-8 are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn snapshot(&self) -> EnvSnapshot {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn snapshot(&self) -> EnvSnapshot {
        self.clone()
    }
}

impl EnvSource for HashMap<String, String> {
    fn snapshot(&self) -> EnvSnapshot {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Prefix of the variables overriding `section`: `user-service` → `USER_SERVICE_`.
pub fn env_prefix(section: &str) -> String {
    format!("{}_", section.to_uppercase().replace('-', "_"))
}

/// Variable overriding `key` in `section`.
pub fn env_key(section: &str, key: &str) -> String {
    format!("{}{}", env_prefix(section), key.to_uppercase())
}
