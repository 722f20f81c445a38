//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hotroute_requests_total` (counter): requests by method and status
//! - `hotroute_request_duration_seconds` (histogram): latency by method
//! - `hotroute_unit_compilations_total` (counter): compile attempts by outcome
//! - `hotroute_cached_units` (gauge): locations with a live compiled unit
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter serves its own listener, separate from routes

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint. Must be called
/// from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a finished request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "hotroute_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "hotroute_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record a compile attempt; `outcome` is `"success"` or `"failure"`.
pub fn record_compilation(outcome: &'static str) {
    metrics::counter!("hotroute_unit_compilations_total", "outcome" => outcome).increment(1);
}

pub fn record_cached_units(count: usize) {
    metrics::gauge!("hotroute_cached_units").set(count as f64);
}
