//! Prometheus metrics exposition.
//!
//! # Metrics
//! - `kernel_requests_total` (counter): requests by source and outcome
//! - `kernel_request_duration_seconds` (histogram): upstream call latency
//! - `kernel_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `kernel_circuit_transitions_total` (counter): transitions by breaker and target state
//! - `kernel_cache_lookups_total` (counter): lookups by source and result
//! - `kernel_cache_entries` (gauge): entries currently cached
//! - `kernel_rate_limited_total` (counter): inbound rejections
//! - `kernel_throttle_wait_seconds` (histogram): outbound throttle waits
//!
//! # Design Decisions
//! - Mirrors the in-process collector; the collector stays the source of alerts
//! - Updates are no-ops until an exporter is installed

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::types::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_request(source: &str, success: bool, cached: bool, duration: Duration) {
    let outcome = match (cached, success) {
        (true, _) => "cached",
        (false, true) => "success",
        (false, false) => "failure",
    };
    counter!("kernel_requests_total", "source" => source.to_string(), "outcome" => outcome)
        .increment(1);
    if !cached {
        histogram!("kernel_request_duration_seconds", "source" => source.to_string())
            .record(duration.as_secs_f64());
    }
}

pub fn record_circuit_state(name: &str, state: CircuitState) {
    gauge!("kernel_circuit_state", "breaker" => name.to_string()).set(state.as_gauge());
    counter!(
        "kernel_circuit_transitions_total",
        "breaker" => name.to_string(),
        "to" => state.as_str()
    )
    .increment(1);
}

pub fn record_cache_lookup(source: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("kernel_cache_lookups_total", "source" => source.to_string(), "result" => result)
        .increment(1);
}

pub fn record_cache_size(size: usize) {
    gauge!("kernel_cache_entries").set(size as f64);
}

pub fn record_rate_limited(kind: &'static str) {
    counter!("kernel_rate_limited_total", "kind" => kind).increment(1);
}

pub fn record_throttle_wait(host: &str, wait: Duration) {
    histogram!("kernel_throttle_wait_seconds", "host" => host.to_string())
        .record(wait.as_secs_f64());
}
