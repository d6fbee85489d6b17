//! Router registry: resolve, filter and mount every declared service.
//!
//! # Lifecycle
//! ```text
//! Unloaded ──load_all──▶ Loading ──▶ Loaded
//!                                └─▶ Failed
//! Loaded / Failed ──reload──▶ Loading ──▶ ...
//! ```
//!
//! # Concurrency
//! - One attempt in flight per service; a second one is rejected with `Busy`.
//!   A worker left behind by a timed-out or dropped attempt keeps the slot
//!   busy until it returns
//! - Per-service state lives in an `ArcSwap` and is replaced wholesale, so
//!   readers never block and never see a half-applied attempt
//! - Resolution runs on the blocking pool under a timeout; a late result
//!   from a timed-out worker is dropped
//! - A failed attempt records the failure and leaves the previous mount active

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::Router;
use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::loader::ConfigError;
use crate::config::schema::GatewayConfig;
use crate::config::store::ConfigStore;
use crate::config::validation::validate_descriptors;
use crate::module::resolver::{panic_message, ModuleResolver, ResolutionError};
use crate::module::ModuleContext;
use crate::observability::metrics;
use crate::routing::descriptor::ServiceDescriptor;
use crate::routing::filter::filter_routes;
use crate::routing::route::RouteCollection;

/// Why a load attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PathNotFound,
    ImportFailure,
    SymbolNotFound,
    InvalidSymbolType,
    Timeout,
    Busy,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::PathNotFound => "path_not_found",
            FailureKind::ImportFailure => "import_failure",
            FailureKind::SymbolNotFound => "symbol_not_found",
            FailureKind::InvalidSymbolType => "invalid_symbol_type",
            FailureKind::Timeout => "timeout",
            FailureKind::Busy => "busy",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl LoadFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<ResolutionError> for LoadFailure {
    fn from(e: ResolutionError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

/// Outcome of one load or reload attempt.
#[derive(Debug, Clone)]
pub enum LoadResult {
    /// The filtered route collection that was mounted.
    Loaded(RouteCollection),
    Failed(LoadFailure),
}

impl LoadResult {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadResult::Loaded(_))
    }

    pub fn routes(&self) -> Option<&RouteCollection> {
        match self {
            LoadResult::Loaded(routes) => Some(routes),
            LoadResult::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&LoadFailure> {
        match self {
            LoadResult::Loaded(_) => None,
            LoadResult::Failed(failure) => Some(failure),
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            LoadResult::Loaded(_) => "loaded",
            LoadResult::Failed(failure) => failure.kind.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServicePhase {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// Whether `reload` may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPolicy {
    Allowed,
    #[default]
    Denied,
}

impl ReloadPolicy {
    /// Reloads are a development feature: allowed only in debug mode.
    pub fn from_debug(debug: bool) -> Self {
        if debug {
            ReloadPolicy::Allowed
        } else {
            ReloadPolicy::Denied
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, ReloadPolicy::Allowed)
    }
}

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Upper bound for one resolution.
    pub resolve_timeout: Duration,
    pub reload_policy: ReloadPolicy,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(5),
            reload_policy: ReloadPolicy::Denied,
        }
    }
}

impl RegistryOptions {
    pub fn from_gateway(config: &GatewayConfig) -> Self {
        Self {
            resolve_timeout: Duration::from_millis(config.resolve_timeout_ms),
            reload_policy: ReloadPolicy::from_debug(config.debug),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReloadError {
    #[error("service '{0}' not found")]
    NotFound(String),

    #[error("reload is only available in debug mode")]
    Forbidden,

    #[error("reload of '{service}' timed out after {after:?}")]
    Timeout { service: String, after: Duration },

    #[error("service '{0}' is already loading")]
    Busy(String),
}

/// A mounted service: its prefix, filtered routes and the router serving them.
#[derive(Clone)]
pub struct MountPoint {
    service_name: String,
    url_prefix: String,
    tags: Vec<String>,
    routes: RouteCollection,
    router: Router,
}

impl MountPoint {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn routes(&self) -> &RouteCollection {
        &self.routes
    }

    /// Router for the service, with paths relative to the prefix.
    pub fn router(&self) -> &Router {
        &self.router
    }
}

impl fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountPoint")
            .field("service_name", &self.service_name)
            .field("url_prefix", &self.url_prefix)
            .field("tags", &self.tags)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

/// Committed state of one service.
#[derive(Debug, Clone)]
struct ServiceState {
    phase: ServicePhase,
    last_result: Option<LoadResult>,
    mount: Option<Arc<MountPoint>>,
}

impl ServiceState {
    fn unloaded() -> Self {
        Self {
            phase: ServicePhase::Unloaded,
            last_result: None,
            mount: None,
        }
    }
}

struct ServiceSlot {
    descriptor: ServiceDescriptor,
    state: ArcSwap<ServiceState>,
    busy: AtomicBool,
    /// Set while a resolution worker runs, including one whose caller timed
    /// out or went away.
    worker: Arc<AtomicBool>,
}

impl ServiceSlot {
    fn new(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            state: ArcSwap::from_pointee(ServiceState::unloaded()),
            busy: AtomicBool::new(false),
            worker: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claim the slot for one attempt. Fails while an earlier attempt or its
    /// orphaned worker is still running.
    fn begin(&self) -> Option<InFlight<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        if self.worker.load(Ordering::Acquire) {
            self.busy.store(false, Ordering::Release);
            return None;
        }

        let previous = self.state.load().phase;
        self.state.rcu(|state| ServiceState {
            phase: ServicePhase::Loading,
            ..ServiceState::clone(state)
        });

        Some(InFlight {
            slot: self,
            previous,
            committed: false,
        })
    }
}

/// Held for the duration of an attempt. Dropping it without committing (the
/// caller went away) restores the previous phase.
struct InFlight<'a> {
    slot: &'a ServiceSlot,
    previous: ServicePhase,
    committed: bool,
}

impl InFlight<'_> {
    fn commit(mut self, state: ServiceState) {
        self.slot.state.store(Arc::new(state));
        self.committed = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let previous = self.previous;
            self.slot.state.rcu(|state| ServiceState {
                phase: previous,
                ..ServiceState::clone(state)
            });
        }
        self.slot.busy.store(false, Ordering::Release);
    }
}

/// Marks a slot's worker as running until the blocking task finishes.
struct WorkerGuard(Arc<AtomicBool>);

impl WorkerGuard {
    fn start(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self(Arc::clone(flag))
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Read-only view of one service for listings.
#[derive(Debug, Clone)]
pub struct ServiceView {
    pub descriptor: ServiceDescriptor,
    pub phase: ServicePhase,
    pub last_result: Option<LoadResult>,
    pub mounted: bool,
}

/// Committed load state across all services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStatus {
    pub loaded_routers: Vec<String>,
    pub failed_loads: BTreeMap<String, String>,
    pub total_loaded: usize,
    pub total_failed: usize,
}

/// Owns every declared service and its mount.
pub struct RouterRegistry {
    slots: Vec<ServiceSlot>,
    resolver: Arc<ModuleResolver>,
    config: Arc<ConfigStore>,
    options: RegistryOptions,
    generation: AtomicU64,
}

impl RouterRegistry {
    /// Create a registry for `descriptors`. Invalid descriptors are rejected
    /// all together.
    pub fn new(
        descriptors: Vec<ServiceDescriptor>,
        resolver: Arc<ModuleResolver>,
        config: Arc<ConfigStore>,
        options: RegistryOptions,
    ) -> Result<Self, ConfigError> {
        validate_descriptors(&descriptors).map_err(ConfigError::Validation)?;

        Ok(Self {
            slots: descriptors.into_iter().map(ServiceSlot::new).collect(),
            resolver,
            config,
            options,
            generation: AtomicU64::new(0),
        })
    }

    /// Load every service concurrently. One failure never affects another.
    pub async fn load_all(&self) -> BTreeMap<String, LoadResult> {
        let attempts = self.slots.iter().map(|slot| async move {
            let name = slot.descriptor.service_name().to_string();
            let result = match slot.begin() {
                Some(guard) => self.run(slot, guard).await,
                None => LoadResult::Failed(LoadFailure::new(FailureKind::Busy, "a load is already in progress")),
            };
            (name, result)
        });

        let results: BTreeMap<String, LoadResult> = join_all(attempts).await.into_iter().collect();

        let loaded = results.values().filter(|r| r.is_loaded()).count();
        tracing::info!(
            loaded,
            failed = results.len() - loaded,
            "Service loading complete"
        );
        results
    }

    /// Resolve, filter and remount one service.
    ///
    /// A failed attempt is returned as `Ok(LoadResult::Failed)` and leaves
    /// the previous mount in place; a timeout is also reported as an error.
    pub async fn reload(&self, service: &str) -> Result<LoadResult, ReloadError> {
        if !self.options.reload_policy.is_allowed() {
            return Err(ReloadError::Forbidden);
        }
        let slot = self
            .slot(service)
            .ok_or_else(|| ReloadError::NotFound(service.to_string()))?;
        let guard = slot.begin().ok_or_else(|| ReloadError::Busy(service.to_string()))?;

        tracing::info!(service, "Reloading service");
        let result = self.run(slot, guard).await;

        match result.failure() {
            Some(failure) if failure.kind == FailureKind::Timeout => Err(ReloadError::Timeout {
                service: service.to_string(),
                after: self.options.resolve_timeout,
            }),
            _ => Ok(result),
        }
    }

    /// Loaded and failed services with failure reasons.
    pub fn get_status(&self) -> RouterStatus {
        let mut status = RouterStatus::default();
        for slot in &self.slots {
            let state = slot.state.load();
            match &state.last_result {
                Some(LoadResult::Loaded(_)) => status.loaded_routers.push(slot.descriptor.service_name().to_string()),
                Some(LoadResult::Failed(failure)) => {
                    status
                        .failed_loads
                        .insert(slot.descriptor.service_name().to_string(), failure.to_string());
                }
                None => {}
            }
        }
        status.total_loaded = status.loaded_routers.len();
        status.total_failed = status.failed_loads.len();
        status
    }

    /// Mounted services, in declaration order.
    pub fn mounts(&self) -> Vec<Arc<MountPoint>> {
        self.slots.iter().filter_map(|slot| slot.state.load().mount.clone()).collect()
    }

    pub fn services(&self) -> Vec<ServiceView> {
        self.slots
            .iter()
            .map(|slot| {
                let state = slot.state.load();
                ServiceView {
                    descriptor: slot.descriptor.clone(),
                    phase: state.phase,
                    last_result: state.last_result.clone(),
                    mounted: state.mount.is_some(),
                }
            })
            .collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.slots.iter().map(|slot| &slot.descriptor)
    }

    pub fn service_phase(&self, service: &str) -> Option<ServicePhase> {
        self.slot(service).map(|slot| slot.state.load().phase)
    }

    /// Bumped whenever the set of mounts changes.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn reload_policy(&self) -> ReloadPolicy {
        self.options.reload_policy
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    fn slot(&self, service: &str) -> Option<&ServiceSlot> {
        self.slots.iter().find(|slot| slot.descriptor.service_name() == service)
    }

    async fn run(&self, slot: &ServiceSlot, guard: InFlight<'_>) -> LoadResult {
        let descriptor = slot.descriptor.clone();
        let attempt = Uuid::new_v4();
        let service = descriptor.service_name().to_string();
        let started = Instant::now();

        tracing::debug!(
            service = %service,
            attempt = %attempt,
            module_path = descriptor.module_path(),
            symbol = descriptor.router_symbol_name(),
            "Resolving service module"
        );

        let config = self
            .config
            .get_service_config(descriptor.config_section_name())
            .unwrap_or_default();
        let ctx = ModuleContext::new(descriptor.service_name(), descriptor.module_path(), config);
        let resolver = Arc::clone(&self.resolver);

        let worker = WorkerGuard::start(&slot.worker);
        let task = tokio::task::spawn_blocking(move || {
            let _worker = worker;
            build_mount(&resolver, &descriptor, &ctx)
        });
        let outcome = match tokio::time::timeout(self.options.resolve_timeout, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Err(LoadFailure::new(FailureKind::ImportFailure, join_error.to_string())),
            Err(_) => Err(LoadFailure::new(
                FailureKind::Timeout,
                format!("resolution exceeded {:?}", self.options.resolve_timeout),
            )),
        };

        let previous_mount = slot.state.load().mount.clone();
        let (result, state) = match outcome {
            Ok(mount) => {
                let result = LoadResult::Loaded(mount.routes.clone());
                tracing::info!(
                    service = %service,
                    attempt = %attempt,
                    prefix = mount.url_prefix(),
                    routes = mount.routes.len(),
                    "Service mounted"
                );
                let state = ServiceState {
                    phase: ServicePhase::Loaded,
                    last_result: Some(result.clone()),
                    mount: Some(Arc::new(mount)),
                };
                (result, state)
            }
            Err(failure) => {
                tracing::warn!(
                    service = %service,
                    attempt = %attempt,
                    kind = %failure.kind,
                    error = %failure.message,
                    kept_previous_mount = previous_mount.is_some(),
                    "Service failed to load"
                );
                let result = LoadResult::Failed(failure);
                let state = ServiceState {
                    phase: ServicePhase::Failed,
                    last_result: Some(result.clone()),
                    mount: previous_mount,
                };
                (result, state)
            }
        };

        let remounted = result.is_loaded();
        guard.commit(state);
        if remounted {
            self.generation.fetch_add(1, Ordering::AcqRel);
            metrics::record_mounted_services(self.mounts().len());
        }
        metrics::record_service_load(&service, result.outcome(), started.elapsed());
        result
    }
}

impl fmt::Debug for RouterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterRegistry")
            .field("services", &self.descriptors().map(|d| d.service_name()).collect::<Vec<_>>())
            .field("options", &self.options)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

/// Blocking part of an attempt: resolve, filter, build the service router.
fn build_mount(
    resolver: &ModuleResolver,
    descriptor: &ServiceDescriptor,
    ctx: &ModuleContext,
) -> Result<MountPoint, LoadFailure> {
    let routes = resolver.resolve(descriptor.module_path(), descriptor.router_symbol_name(), ctx)?;
    let routes = filter_routes(&routes, descriptor.selection());

    let router = catch_unwind(AssertUnwindSafe(|| routes.to_router())).map_err(|payload| {
        LoadFailure::new(
            FailureKind::ImportFailure,
            format!("invalid route table: {}", panic_message(payload.as_ref())),
        )
    })?;

    Ok(MountPoint {
        service_name: descriptor.service_name().to_string(),
        url_prefix: descriptor.url_prefix().to_string(),
        tags: descriptor.tags().to_vec(),
        routes,
        router,
    })
}
