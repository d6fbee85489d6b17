//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! request
//!     → server.rs (request id, trace, CORS, timeout)
//!     → gateway endpoint (handlers.rs, auth.rs for management)
//!       or dispatch.rs → mounted service router
//!     → response.rs for errors the gateway answers itself
//! ```

pub mod auth;
pub mod dispatch;
pub mod handlers;
pub mod response;
pub mod server;

pub use dispatch::Dispatcher;
pub use response::ApiError;
pub use server::{AppState, GatewayServer};
