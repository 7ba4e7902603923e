//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method and status
//! - `proxy_request_duration_seconds` (histogram): time to response headers
//! - `proxy_upstream_responses_total` (counter): upstream statuses by route
//! - `proxy_forward_errors_total` (counter): failures by kind and route
//! - `proxy_in_flight_requests` (gauge): admitted requests not yet finished
//! - `proxy_relayed_bytes_total` (counter): response bytes by route
//! - `proxy_relay_duration_seconds` (histogram): receipt to last byte
//!
//! Recording is a no-op until [`init_metrics`] installs the Prometheus
//! recorder, so handlers record unconditionally.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// One inbound request answered, successfully or not.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [("method", method.to_string()), ("status", status.to_string())];
    counter!("proxy_requests_total", &labels).increment(1);
    histogram!("proxy_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_response(route: &str, status: u16) {
    counter!(
        "proxy_upstream_responses_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_forward_error(kind: &'static str, route: &str) {
    counter!("proxy_forward_errors_total", "kind" => kind, "route" => route.to_string()).increment(1);
}

pub fn in_flight_changed(delta: f64) {
    gauge!("proxy_in_flight_requests").increment(delta);
}

/// A response body finished relaying.
pub fn record_relay(route: &str, bytes: u64, start: Instant) {
    counter!("proxy_relayed_bytes_total", "route" => route.to_string()).increment(bytes);
    histogram!("proxy_relay_duration_seconds", "route" => route.to_string()).record(start.elapsed().as_secs_f64());
}
