//! Composed configuration store.
//!
//! # Data Flow
//! ```text
//! file (TOML) ─┐
//! defaults ────┼─→ ConfigSet::compose ─→ ArcSwap<ConfigSet> ─→ readers
//! environment ─┘
//! ```
//!
//! A `ConfigSet` is composed completely before it is published; reload swaps
//! the whole set, so readers see either the old or the new configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::compose::compose_section_among;
use crate::config::env::{EnvSnapshot, EnvSource, ProcessEnv};
use crate::config::loader::{read_config_file, table_to_json, ConfigError, MissingFilePolicy};
use crate::config::schema::{ConfigFile, GatewayConfig, MountConfig, ServiceConfig};
use crate::observability::metrics;

const GATEWAY_SECTION: &str = "gateway";

/// Options fixed for the lifetime of a [`ConfigStore`].
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    /// Configuration file. `None` composes defaults and environment only.
    pub path: Option<PathBuf>,

    pub missing_file: MissingFilePolicy,

    /// Built-in defaults per service section.
    pub service_defaults: BTreeMap<String, ServiceConfig>,
}

impl ConfigOptions {
    /// Options for a file that must exist.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            missing_file: MissingFilePolicy::Required,
            service_defaults: BTreeMap::new(),
        }
    }

    pub fn with_missing_file(mut self, policy: MissingFilePolicy) -> Self {
        self.missing_file = policy;
        self
    }

    pub fn with_service_defaults(mut self, section: impl Into<String>, defaults: ServiceConfig) -> Self {
        self.service_defaults.insert(section.into(), defaults);
        self
    }
}

/// Where a composed set came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn label(&self) -> &'static str {
        match self {
            ConfigSource::File(_) => "file",
            ConfigSource::Defaults => "defaults",
        }
    }
}

/// A fully composed, immutable configuration.
#[derive(Debug, Clone)]
pub struct ConfigSet {
    source: ConfigSource,
    gateway: GatewayConfig,
    services: BTreeMap<String, ServiceConfig>,
    mounts: Vec<MountConfig>,
    env: EnvSnapshot,
    /// Every section name the set knows about, for prefix shadowing.
    sections: Vec<String>,
}

impl ConfigSet {
    /// Compose a set from a parsed file, service defaults and an environment snapshot.
    pub fn compose(
        source: ConfigSource,
        file: ConfigFile,
        service_defaults: &BTreeMap<String, ServiceConfig>,
        env: EnvSnapshot,
    ) -> Result<Self, ConfigError> {
        let mut file_sections: BTreeMap<String, Map<String, Value>> = file
            .services
            .into_iter()
            .map(|(name, table)| (name, table_to_json(table)))
            .collect();

        let mut names: Vec<String> = file_sections.keys().cloned().collect();
        names.extend(service_defaults.keys().cloned());
        names.sort();
        names.dedup();

        let mut sections = names.clone();
        sections.push(GATEWAY_SECTION.to_string());
        sections.extend(
            file.mounts
                .iter()
                .map(|m| m.config_section_name.clone().unwrap_or_else(|| m.service_name.clone())),
        );
        sections.sort();
        sections.dedup();

        let gateway = compose_gateway(file.gateway, &sections, &env)?;

        let services = names
            .into_iter()
            .map(|name| {
                let defaults: Map<String, Value> = service_defaults
                    .get(&name)
                    .map(|d| d.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
                    .unwrap_or_default();
                let file_section = file_sections.remove(&name);
                let composed =
                    compose_section_among(&name, &sections, &defaults, file_section.as_ref(), &env);
                (name, ServiceConfig::from(composed))
            })
            .collect();

        Ok(Self {
            source,
            gateway,
            services,
            mounts: file.mounts,
            env,
            sections,
        })
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    pub fn gateway(&self) -> &GatewayConfig {
        &self.gateway
    }

    pub fn mounts(&self) -> &[MountConfig] {
        &self.mounts
    }

    /// Sections with a file entry or built-in defaults.
    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Composed configuration for `section`.
    ///
    /// Sections without a file entry or defaults are composed from the
    /// environment snapshot alone; `None` when nothing matches.
    pub fn service(&self, section: &str) -> Option<ServiceConfig> {
        if let Some(config) = self.services.get(section) {
            return Some(config.clone());
        }
        let composed = compose_section_among(section, &self.sections, &Map::new(), None, &self.env);
        (!composed.is_empty()).then(|| ServiceConfig::from(composed))
    }
}

/// Compose the gateway section.
///
/// A file value the typed config rejects fails the load. An environment
/// override it rejects, such as a port out of range, is dropped with a
/// warning and the file or default value stays.
fn compose_gateway(
    section: toml::Table,
    sections: &[String],
    env: &EnvSnapshot,
) -> Result<GatewayConfig, ConfigError> {
    let defaults = match serde_json::to_value(GatewayConfig::default()) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let file = table_to_json(section);

    let mut accepted: Map<String, Value> =
        compose_section_among(GATEWAY_SECTION, sections, &defaults, Some(&file), &EnvSnapshot::new())
            .into_iter()
            .collect();
    let mut gateway: GatewayConfig =
        serde_json::from_value(Value::Object(accepted.clone())).map_err(|e| ConfigError::Invalid {
            section: GATEWAY_SECTION.to_string(),
            message: e.to_string(),
        })?;

    let overridden = compose_section_among(GATEWAY_SECTION, sections, &defaults, Some(&file), env);
    for (key, value) in overridden {
        if accepted.get(&key) == Some(&value) {
            continue;
        }
        let mut candidate = accepted.clone();
        candidate.insert(key.clone(), value);
        match serde_json::from_value::<GatewayConfig>(Value::Object(candidate.clone())) {
            Ok(config) => {
                accepted = candidate;
                gateway = config;
            }
            Err(e) => {
                tracing::warn!(
                    section = GATEWAY_SECTION,
                    key = %key,
                    error = %e,
                    "Ignoring environment override"
                );
            }
        }
    }

    Ok(gateway)
}

/// Summary of the configuration state for status payloads.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfigStatus {
    pub config_file: Option<String>,
    pub source: &'static str,
    pub loaded_services: Vec<String>,
    pub total_services: usize,
    pub generation: u64,
}

/// Holds the current [`ConfigSet`] and rebuilds it on reload.
pub struct ConfigStore {
    options: ConfigOptions,
    env: Box<dyn EnvSource>,
    current: ArcSwap<ConfigSet>,
    generation: AtomicU64,
}

impl ConfigStore {
    /// Load the configuration described by `options`, reading overrides from `env`.
    pub fn load(options: ConfigOptions, env: impl EnvSource + 'static) -> Result<Self, ConfigError> {
        let set = build(&options, &env)?;
        tracing::info!(
            source = set.source().label(),
            services = set.services.len(),
            mounts = set.mounts.len(),
            "Configuration loaded"
        );

        Ok(Self {
            options,
            env: Box::new(env),
            current: ArcSwap::from_pointee(set),
            generation: AtomicU64::new(0),
        })
    }

    /// Load using the process environment.
    pub fn from_process_env(options: ConfigOptions) -> Result<Self, ConfigError> {
        Self::load(options, ProcessEnv)
    }

    /// Re-read file and environment and swap in the new set.
    ///
    /// On error the current set stays in place.
    pub fn reload(&self) -> Result<Arc<ConfigSet>, ConfigError> {
        match build(&self.options, self.env.as_ref()) {
            Ok(set) => {
                let set = Arc::new(set);
                self.current.store(Arc::clone(&set));
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                metrics::record_config_reload("success");
                tracing::info!(generation, source = set.source().label(), "Configuration reloaded");
                Ok(set)
            }
            Err(e) => {
                metrics::record_config_reload("failure");
                tracing::error!(error = %e, "Failed to reload configuration, keeping current");
                Err(e)
            }
        }
    }

    pub fn current(&self) -> Arc<ConfigSet> {
        self.current.load_full()
    }

    pub fn get_gateway_config(&self) -> GatewayConfig {
        self.current.load().gateway.clone()
    }

    pub fn get_service_config(&self, section: &str) -> Option<ServiceConfig> {
        self.current.load().service(section)
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.options.path.as_deref()
    }

    /// Number of successful reloads since construction.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ConfigStatus {
        let set = self.current.load();
        let loaded_services = set.service_names();
        ConfigStatus {
            config_file: self.options.path.as_ref().map(|p| p.display().to_string()),
            source: set.source().label(),
            total_services: loaded_services.len(),
            loaded_services,
            generation: self.generation(),
        }
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("options", &self.options)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

fn build(options: &ConfigOptions, env: &dyn EnvSource) -> Result<ConfigSet, ConfigError> {
    let (source, file) = match &options.path {
        None => (ConfigSource::Defaults, ConfigFile::default()),
        Some(path) => match read_config_file(path) {
            Ok(file) => (ConfigSource::File(path.clone()), file),
            Err(ConfigError::NotFound { path }) if options.missing_file == MissingFilePolicy::UseDefaults => {
                tracing::warn!(path = %path.display(), "Configuration file not found, using defaults");
                (ConfigSource::Defaults, ConfigFile::default())
            }
            Err(e) => return Err(e),
        },
    };
    ConfigSet::compose(source, file, &options.service_defaults, env.snapshot())
}
