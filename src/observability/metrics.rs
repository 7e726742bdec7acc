//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): proxy requests by outcome
//! - `relay_duration_seconds` (histogram): request start to stream end
//! - `relay_bytes_total` (counter): bytes relayed to clients
//! - `relay_active_streams` (gauge): streams currently relaying
//! - `relay_upstream_retries_total` (counter): connect-stage retries
//! - `relay_upstream_failures_total` (counter): fetch failures by kind
//! - `storage_operations_total` (counter): blob store calls by op and result

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_stream_outcome(outcome: &'static str, bytes: u64, started: Instant) {
    ::metrics::counter!("relay_requests_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("relay_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
    if bytes > 0 {
        ::metrics::counter!("relay_bytes_total").increment(bytes);
    }
}

pub fn stream_started() {
    ::metrics::gauge!("relay_active_streams").increment(1.0);
}

pub fn stream_finished() {
    ::metrics::gauge!("relay_active_streams").decrement(1.0);
}

pub fn record_upstream_retry() {
    ::metrics::counter!("relay_upstream_retries_total").increment(1);
}

pub fn record_upstream_failure(kind: &'static str) {
    ::metrics::counter!("relay_upstream_failures_total", "kind" => kind).increment(1);
}

pub fn record_storage_op(op: &'static str, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    ::metrics::counter!("storage_operations_total", "op" => op, "result" => result).increment(1);
}
