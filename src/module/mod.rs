//! Service modules.
//!
//! A backend is linked into the binary as a [`ServiceModule`] and registered
//! with the [`ModuleResolver`] under a module path key. Loading a module yields
//! its named exports; the gateway mounts the export named by the mount's
//! router symbol.
//!
//! ```text
//! ModuleResolver::resolve(path, symbol)
//!     → registered ServiceModule, or route manifest on disk
//!     → load(&ModuleContext) → ModuleExports
//!     → exports[symbol] must be Export::Routes
//! ```

use std::collections::BTreeMap;

use crate::config::schema::ServiceConfig;
use crate::routing::route::RouteCollection;

pub mod manifest;
pub mod resolver;

pub use manifest::ManifestModule;
pub use resolver::{ModuleResolver, ResolutionError};

/// What a module sees while loading.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    service_name: String,
    module_path: String,
    config: ServiceConfig,
}

impl ModuleContext {
    pub fn new(service_name: impl Into<String>, module_path: impl Into<String>, config: ServiceConfig) -> Self {
        Self {
            service_name: service_name.into(),
            module_path: module_path.into(),
            config,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    /// Composed configuration of the service. Empty when it has none.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

/// One named value exported by a module.
#[derive(Debug, Clone)]
pub enum Export {
    Routes(RouteCollection),
    /// Anything that is not a route collection; `kind` names what it is.
    Other { kind: String },
}

impl Export {
    pub fn kind(&self) -> &str {
        match self {
            Export::Routes(_) => "route collection",
            Export::Other { kind } => kind,
        }
    }
}

/// Named exports of a loaded module.
#[derive(Debug, Clone, Default)]
pub struct ModuleExports {
    symbols: BTreeMap<String, Export>,
}

impl ModuleExports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, export: Export) {
        self.symbols.insert(name.into(), export);
    }

    pub fn with_routes(mut self, name: impl Into<String>, routes: RouteCollection) -> Self {
        self.insert(name, Export::Routes(routes));
        self
    }

    pub fn with_other(mut self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.insert(name, Export::Other { kind: kind.into() });
        self
    }

    pub fn get(&self, name: &str) -> Option<&Export> {
        self.symbols.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Export> {
        self.symbols.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.symbols.keys().cloned().collect()
    }
}

/// A backend linked into the gateway.
///
/// `load` runs on a blocking thread and again on every reload; it must not
/// cache its exports across calls.
pub trait ServiceModule: Send + Sync + 'static {
    fn load(&self, ctx: &ModuleContext) -> anyhow::Result<ModuleExports>;
}

impl<F> ServiceModule for F
where
    F: Fn(&ModuleContext) -> anyhow::Result<ModuleExports> + Send + Sync + 'static,
{
    fn load(&self, ctx: &ModuleContext) -> anyhow::Result<ModuleExports> {
        self(ctx)
    }
}
