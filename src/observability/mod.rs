//! Logging and metrics.
//!
//! ```text
//! registry, config store, HTTP layer
//!     → logging.rs (tracing events, pretty or JSON on stdout)
//!     → metrics.rs (counters, gauges, histograms for Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
