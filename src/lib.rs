//! Dynamic service gateway.
//!
//! Loads independently developed service modules, filters their endpoints
//! and mounts them under URL prefixes of a single HTTP server.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod module;
pub mod observability;
pub mod routing;
pub mod status;

pub use config::{ConfigOptions, ConfigStore, GatewayConfig};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use module::{ModuleContext, ModuleExports, ModuleResolver, ServiceModule};
pub use routing::{RouterRegistry, ServiceDescriptor};
