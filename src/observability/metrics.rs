//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by outcome
//! - `gateway_request_duration_seconds` (histogram): accept-to-close latency
//! - `gateway_worker_spawns_total` (counter): worker processes started, by mode
//! - `gateway_worker_failures_total` (counter): worker errors, by kind
//! - `gateway_active_connections` (gauge): current connection count
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an exporter it is a no-op
//! - The Prometheus exporter serves its own HTTP listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::config::WorkerMode;

/// Install the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(outcome: &'static str, started: Instant) {
    metrics::counter!("gateway_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("gateway_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_worker_spawn(mode: WorkerMode) {
    metrics::counter!("gateway_worker_spawns_total", "mode" => mode.to_string()).increment(1);
}

pub fn record_worker_failure(kind: &'static str) {
    metrics::counter!("gateway_worker_failures_total", "kind" => kind).increment(1);
}

pub fn set_active_connections(count: u64) {
    metrics::gauge!("gateway_active_connections").set(count as f64);
}
