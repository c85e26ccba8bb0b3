//! Metrics collection and exposition.
//!
//! # Metrics
//! - `echo_requests_total` (counter): requests by method and status
//! - `echo_request_duration_seconds` (histogram): latency distribution
//! - `echo_in_flight_requests` (gauge): requests currently being served
//! - `echo_spans_exported_total` (counter): spans confirmed by the sink
//! - `echo_spans_dropped_total` (counter): spans lost, by reason
//! - `echo_export_failures_total` (counter): failed export attempts
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!(
        "echo_requests_total",
        "method" => method.to_string(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "echo_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn set_in_flight(count: usize) {
    gauge!("echo_in_flight_requests").set(count as f64);
}

pub fn record_spans_exported(sink: &str, count: usize) {
    counter!("echo_spans_exported_total", "sink" => sink.to_string()).increment(count as u64);
}

pub fn record_spans_dropped(reason: &'static str, count: usize) {
    counter!("echo_spans_dropped_total", "reason" => reason).increment(count as u64);
}

pub fn record_export_failure(sink: &str) {
    counter!("echo_export_failures_total", "sink" => sink.to_string()).increment(1);
}
