//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): finished requests by outcome and status
//! - `balancer_request_duration_seconds` (histogram): forward latency per backend
//! - `balancer_forward_failures_total` (counter): failed attempts by backend and reason
//! - `balancer_backend_alive` (gauge): 1=alive, 0=dead
//! - `balancer_queue_depth` (gauge): requests waiting for a backend
//! - `balancer_requests_denied_total` (counter): allowlist rejections
//! - `balancer_queue_rejected_total` (counter): requests refused on a full queue

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a request that reached a backend and got an answer.
pub fn record_forwarded(backend: &str, status: u16, start: Instant) {
    counter!(
        "balancer_requests_total",
        "outcome" => "forwarded",
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("balancer_request_duration_seconds", "backend" => backend.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a failed forward attempt.
pub fn record_failure(backend: &str, reason: &'static str) {
    counter!(
        "balancer_forward_failures_total",
        "backend" => backend.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_denied() {
    counter!("balancer_requests_denied_total").increment(1);
}

pub fn record_queue_rejected() {
    counter!("balancer_queue_rejected_total").increment(1);
}

pub fn set_queue_depth(depth: usize) {
    gauge!("balancer_queue_depth").set(depth as f64);
}

pub fn record_backend_alive(backend: &str, alive: bool) {
    gauge!("balancer_backend_alive", "backend" => backend.to_string())
        .set(if alive { 1.0 } else { 0.0 });
}
