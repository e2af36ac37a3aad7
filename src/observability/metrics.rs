//! Metrics collection and exposition.
//!
//! # Metrics
//! - `responder_requests_total` (counter): requests answered, by route and status
//! - `responder_request_duration_seconds` (histogram): time spent in the responder, by route
//! - `responder_faults_total` (counter): handler faults, by route and kind
//! - `dispatch_misses_total` (counter): requests with no registered responder
//! - `registered_responders` (gauge): current route table size

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP scrape endpoint.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one answered request.
pub fn record_request(route: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "responder_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("responder_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a handler fault.
pub fn record_fault(route: &str, kind: &'static str) {
    ::metrics::counter!("responder_faults_total", "route" => route.to_string(), "kind" => kind)
        .increment(1);
}

/// Record a request that matched no responder.
pub fn record_miss() {
    ::metrics::counter!("dispatch_misses_total").increment(1);
}

/// Publish the current number of registered responders.
pub fn set_registered(count: usize) {
    ::metrics::gauge!("registered_responders").set(count as f64);
}
