//! Metrics collection and exposition.
//!
//! # Metrics
//! - `redirector_requests_total` (counter): redirect requests by method, status
//! - `redirector_request_duration_seconds` (histogram): time to answer a redirect
//! - `redirector_reloads_total` (counter): rule reloads by result
//! - `redirector_rules` (gauge): services in the published table
//!
//! # Design Decisions
//! - `metrics` facade everywhere; the Prometheus exporter is opt-in
//! - Labels are bounded: HTTP method and status code only, never service names

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "redirector_requests_total";
pub const REQUEST_DURATION: &str = "redirector_request_duration_seconds";
pub const RELOADS_TOTAL: &str = "redirector_reloads_total";
pub const RULES: &str = "redirector_rules";

/// Install the Prometheus exporter with its own HTTP listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Record one answered redirect request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION).record(start.elapsed().as_secs_f64());
}

/// Record the outcome of a rule reload.
pub fn record_reload(success: bool) {
    let result = if success { "ok" } else { "error" };
    metrics::counter!(RELOADS_TOTAL, "result" => result).increment(1);
}

/// Record the size of a freshly published table.
pub fn record_rules(count: usize) {
    metrics::gauge!(RULES).set(count as f64);
}
