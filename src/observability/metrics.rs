//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): requests by handler, status
//! - `bridge_request_duration_seconds` (histogram): latency by handler
//! - `bridge_async_started_total` (counter): continuations started by handler
//! - `bridge_pool_rejections_total` (counter): tasks refused by the worker pool
//! - `bridge_pool_in_flight` (gauge): tasks running or queued on the worker pool
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed recorder it is a no-op
//! - The Prometheus exporter is opt-in and installed by the binary

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Record a finished request.
pub fn record_request(handler: &str, status: u16, start: Instant) {
    metrics::counter!(
        "bridge_requests_total",
        "handler" => handler.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "bridge_request_duration_seconds",
        "handler" => handler.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_async_started(handler: &str) {
    metrics::counter!("bridge_async_started_total", "handler" => handler.to_string()).increment(1);
}

pub fn record_pool_rejection() {
    metrics::counter!("bridge_pool_rejections_total").increment(1);
}

pub fn record_pool_in_flight(in_flight: usize) {
    metrics::gauge!("bridge_pool_in_flight").set(in_flight as f64);
}

/// Install the Prometheus exporter listening on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}
