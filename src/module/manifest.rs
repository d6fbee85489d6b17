//! Route manifests.
//!
//! A manifest is a TOML file standing in for a module. Every top-level table
//! with a `routes` array is exported as a route collection under its key; any
//! other top-level value is exported as a non-route symbol.
//!
//! ```toml
//! version = "1.0"
//!
//! [[router.routes]]
//! path = "/users"
//! methods = ["GET", "POST"]
//! body = { users = [] }
//!
//! [[router.routes]]
//! path = "/admin"
//! status = 403
//! ```
//!
//! Routes answer with their fixed `status` (default 200) and JSON `body`
//! (default `{"service": <name>, "path": <path>}`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use axum::http::{Method, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::loader::toml_to_json;
use crate::module::{Export, ModuleContext, ModuleExports, ServiceModule};
use crate::routing::route::{RouteCollection, RouteEntry};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouteSpec {
    path: String,
    #[serde(default = "default_methods")]
    methods: Vec<String>,
    #[serde(default = "default_status")]
    status: u16,
    body: Option<toml::Value>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

fn default_status() -> u16 {
    200
}

/// A module backed by a manifest file. The file is read on every load.
#[derive(Debug, Clone)]
pub struct ManifestModule {
    path: PathBuf,
}

impl ManifestModule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ServiceModule for ManifestModule {
    fn load(&self, ctx: &ModuleContext) -> anyhow::Result<ModuleExports> {
        let content =
            fs::read_to_string(&self.path).with_context(|| format!("reading {}", self.path.display()))?;
        parse_manifest(&content, ctx).with_context(|| format!("loading {}", self.path.display()))
    }
}

/// Parse manifest text into exports.
pub fn parse_manifest(content: &str, ctx: &ModuleContext) -> anyhow::Result<ModuleExports> {
    let table: toml::Table = toml::from_str(content)?;
    let mut exports = ModuleExports::new();

    for (name, value) in table {
        let export = match value {
            toml::Value::Table(mut symbol) => match symbol.remove("routes") {
                Some(toml::Value::Array(routes)) => {
                    let routes = build_routes(routes, ctx).with_context(|| format!("symbol '{name}'"))?;
                    Export::Routes(routes)
                }
                _ => Export::Other {
                    kind: "table".to_string(),
                },
            },
            other => Export::Other {
                kind: other.type_str().to_string(),
            },
        };
        exports.insert(name, export);
    }

    Ok(exports)
}

fn build_routes(specs: Vec<toml::Value>, ctx: &ModuleContext) -> anyhow::Result<RouteCollection> {
    let mut routes = RouteCollection::new();

    for (index, spec) in specs.into_iter().enumerate() {
        let spec: RouteSpec = spec.try_into().with_context(|| format!("route #{index}"))?;

        let methods = spec
            .methods
            .iter()
            .map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|_| anyhow!("invalid method '{m}'")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let status = StatusCode::from_u16(spec.status).map_err(|_| anyhow!("invalid status {}", spec.status))?;
        let body = match spec.body {
            Some(body) => toml_to_json(body),
            None => json!({ "service": ctx.service_name(), "path": &spec.path }),
        };

        let mut entry = RouteEntry::new(spec.path, methods, fixed_response(status, body))?;
        for (key, value) in spec.metadata {
            entry = entry.with_metadata(key, value);
        }
        routes.push(entry)?;
    }

    Ok(routes)
}

fn fixed_response(
    status: StatusCode,
    body: Value,
) -> impl Fn() -> std::future::Ready<(StatusCode, Json<Value>)> + Clone + Send + Sync + 'static {
    move || std::future::ready((status, Json(body.clone())))
}
