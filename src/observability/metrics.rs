//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_service_loads_total` (counter): load attempts by service, outcome
//! - `gateway_service_load_duration_seconds` (histogram): resolution latency by service
//! - `gateway_mounted_services` (gauge): services currently mounted
//! - `gateway_config_reloads_total` (counter): configuration reloads by outcome
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics listener started");
    Ok(())
}

pub fn record_service_load(service: &str, outcome: &'static str, duration: Duration) {
    counter!("gateway_service_loads_total", "service" => service.to_string(), "outcome" => outcome).increment(1);
    histogram!("gateway_service_load_duration_seconds", "service" => service.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_mounted_services(count: usize) {
    gauge!("gateway_mounted_services").set(count as f64);
}

pub fn record_config_reload(outcome: &'static str) {
    counter!("gateway_config_reloads_total", "outcome" => outcome).increment(1);
}
