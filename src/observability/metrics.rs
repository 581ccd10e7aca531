//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_sessions_total` (counter): sessions by outcome
//! - `bridge_session_duration_seconds` (histogram): open-to-close time
//! - `bridge_active_sessions` (gauge): sessions currently in flight
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_session(outcome: &'static str, start_time: Instant) {
    metrics::counter!("bridge_sessions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("bridge_session_duration_seconds")
        .record(start_time.elapsed().as_secs_f64());
}

pub fn set_active_sessions(active: u64) {
    metrics::gauge!("bridge_active_sessions").set(active as f64);
}
