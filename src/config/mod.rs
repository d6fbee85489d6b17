//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → compose.rs (defaults < file < environment, per section)
//!     → store.rs (ConfigSet, immutable, shared via ArcSwap)
//!
//! [[mounts]]
//!     → validation.rs (descriptors, all errors at once)
//!
//! On reload (endpoint or watcher.rs):
//!     → loader.rs + compose.rs build a complete new set
//!     → atomic swap in ConfigStore
//! ```
//!
//! # Design Decisions
//! - A set is immutable once composed; changes require a full reload
//! - All gateway fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod compose;
pub mod env;
pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use env::{EnvSource, ProcessEnv};
pub use loader::{ConfigError, MissingFilePolicy};
pub use schema::{GatewayConfig, MountConfig, ServiceConfig};
pub use store::{ConfigOptions, ConfigSet, ConfigStatus, ConfigStore};
pub use validation::{descriptors_from_mounts, validate_descriptors, ValidationError};
