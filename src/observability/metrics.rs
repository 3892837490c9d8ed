//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, rejections, upstream errors, connections)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-service and aggregate metrics
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): rejections by tier
//! - `gateway_upstream_errors_total` (counter): proxy failures by service, kind
//! - `gateway_backend_health` (gauge): 1=healthy, 0=unhealthy
//! - `gateway_ws_connections` (gauge): registered WebSocket connections
//! - `gateway_rate_limit_buckets` (gauge): live per-key buckets
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Labels for method, service, status code

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, elapsed: Duration) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "service" => service.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "service" => service.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_rate_limited(tier: &'static str) {
    metrics::counter!("gateway_rate_limited_total", "tier" => tier).increment(1);
}

pub fn record_upstream_error(service: &str, kind: &'static str) {
    metrics::counter!(
        "gateway_upstream_errors_total",
        "service" => service.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_backend_health(service: &str, healthy: bool) {
    metrics::gauge!("gateway_backend_health", "service" => service.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn set_ws_connections(count: usize) {
    metrics::gauge!("gateway_ws_connections").set(count as f64);
}

pub fn set_rate_limit_buckets(count: usize) {
    metrics::gauge!("gateway_rate_limit_buckets").set(count as f64);
}
