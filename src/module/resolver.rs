//! Module resolution.
//!
//! # Steps
//! 1. Locate: a registered module, else a manifest file relative to the base
//!    directory (`PathNotFound`)
//! 2. Load: run the module; errors and panics are captured (`ImportFailure`)
//! 3. Look up the symbol (`SymbolNotFound`)
//! 4. Check it is a route collection (`InvalidSymbolType`)
//!
//! Nothing is cached: every resolve loads the module again.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::module::manifest::ManifestModule;
use crate::module::{Export, ModuleContext, ServiceModule};
use crate::routing::registry::FailureKind;
use crate::routing::route::RouteCollection;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("module '{module_path}' not found")]
    PathNotFound { module_path: String },

    #[error("module '{module_path}' failed to load: {cause}")]
    ImportFailure { module_path: String, cause: String },

    #[error("module '{module_path}' has no symbol '{symbol}' (available: {})", .available.join(", "))]
    SymbolNotFound {
        module_path: String,
        symbol: String,
        available: Vec<String>,
    },

    #[error("symbol '{symbol}' in module '{module_path}' is a {found}, not a route collection")]
    InvalidSymbolType {
        module_path: String,
        symbol: String,
        found: String,
    },
}

impl ResolutionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ResolutionError::PathNotFound { .. } => FailureKind::PathNotFound,
            ResolutionError::ImportFailure { .. } => FailureKind::ImportFailure,
            ResolutionError::SymbolNotFound { .. } => FailureKind::SymbolNotFound,
            ResolutionError::InvalidSymbolType { .. } => FailureKind::InvalidSymbolType,
        }
    }
}

/// Resolves module paths to route collections.
#[derive(Default)]
pub struct ModuleResolver {
    modules: DashMap<String, Arc<dyn ServiceModule>>,
    base_dir: Option<PathBuf>,
}

impl ModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative manifest paths against `dir` instead of the working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Register `module` under `module_path`, replacing any previous one.
    pub fn register(&self, module_path: impl Into<String>, module: impl ServiceModule) {
        let module_path = module_path.into();
        tracing::debug!(module_path = %module_path, "Module registered");
        self.modules.insert(module_path, Arc::new(module));
    }

    pub fn is_registered(&self, module_path: &str) -> bool {
        self.modules.contains_key(module_path)
    }

    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Load the module at `module_path` and return its `symbol` export.
    ///
    /// Blocking: registered modules run arbitrary code and manifests hit the disk.
    pub fn resolve(
        &self,
        module_path: &str,
        symbol: &str,
        ctx: &ModuleContext,
    ) -> Result<RouteCollection, ResolutionError> {
        let module = self.locate(module_path)?;

        let loaded = catch_unwind(AssertUnwindSafe(|| module.load(ctx)));
        let mut exports = match loaded {
            Ok(Ok(exports)) => exports,
            Ok(Err(e)) => {
                return Err(ResolutionError::ImportFailure {
                    module_path: module_path.to_string(),
                    cause: format!("{e:#}"),
                })
            }
            Err(payload) => {
                return Err(ResolutionError::ImportFailure {
                    module_path: module_path.to_string(),
                    cause: format!("panicked: {}", panic_message(payload.as_ref())),
                })
            }
        };

        match exports.remove(symbol) {
            Some(Export::Routes(routes)) => Ok(routes),
            Some(other) => Err(ResolutionError::InvalidSymbolType {
                module_path: module_path.to_string(),
                symbol: symbol.to_string(),
                found: other.kind().to_string(),
            }),
            None => Err(ResolutionError::SymbolNotFound {
                module_path: module_path.to_string(),
                symbol: symbol.to_string(),
                available: exports.names(),
            }),
        }
    }

    fn locate(&self, module_path: &str) -> Result<Arc<dyn ServiceModule>, ResolutionError> {
        if let Some(module) = self.modules.get(module_path) {
            return Ok(Arc::clone(module.value()));
        }

        let path = self.manifest_path(module_path);
        if path.is_file() {
            return Ok(Arc::new(ManifestModule::new(path)));
        }

        Err(ResolutionError::PathNotFound {
            module_path: module_path.to_string(),
        })
    }

    fn manifest_path(&self, module_path: &str) -> PathBuf {
        let path = Path::new(module_path);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl std::fmt::Debug for ModuleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleResolver")
            .field("modules", &self.registered())
            .field("base_dir", &self.base_dir)
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
