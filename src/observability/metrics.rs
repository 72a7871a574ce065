//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method and status
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_forward_duration_seconds` (histogram): per-attempt latency by cluster
//! - `proxy_forward_retries_total` (counter): retries by cluster
//! - `proxy_destination_health` (gauge): 1=healthy, 0=unknown, -1=unhealthy
//! - `proxy_snapshot_version` (gauge): version of the active snapshot

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::HealthState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_forward_latency(cluster: &str, latency: Duration) {
    histogram!("proxy_forward_duration_seconds", "cluster" => cluster.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_retry(cluster: &str) {
    counter!("proxy_forward_retries_total", "cluster" => cluster.to_string()).increment(1);
}

pub fn record_destination_health(cluster: &str, address: &str, state: HealthState) {
    let value = match state {
        HealthState::Healthy => 1.0,
        HealthState::Unknown => 0.0,
        HealthState::Unhealthy => -1.0,
    };
    gauge!(
        "proxy_destination_health",
        "cluster" => cluster.to_string(),
        "address" => address.to_string()
    )
    .set(value);
}

pub fn record_snapshot(version: u64) {
    gauge!("proxy_snapshot_version").set(version as f64);
}
