//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! ServiceDescriptor[] (from [[mounts]])
//!     → registry.rs (one attempt per service, concurrently)
//!         → ModuleResolver::resolve (route.rs: RouteCollection)
//!         → filter.rs (include / exclude patterns)
//!         → MountPoint (prefix, filtered routes, router)
//!     → committed per service, atomically
//! ```
//!
//! # Design Decisions
//! - Filtering is pure and shares entries with its input
//! - A failure is recorded per service, never fatal to the whole gateway
//! - Mounts only change on a successful attempt

pub mod descriptor;
pub mod filter;
pub mod registry;
pub mod route;

pub use descriptor::ServiceDescriptor;
pub use filter::{filter_routes, EndpointPattern, EndpointSelection};
pub use registry::{
    FailureKind, LoadFailure, LoadResult, MountPoint, RegistryOptions, ReloadError, ReloadPolicy, RouterRegistry,
    RouterStatus, ServicePhase, ServiceView,
};
pub use route::{RouteCollection, RouteEntry, RouteError};
