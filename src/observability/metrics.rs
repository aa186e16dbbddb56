//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by method, status, outcome
//! - `edge_request_duration_seconds` (histogram): time until the response head
//! - `edge_config_reloads_total` (counter): accepted configuration reloads
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// How a request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// HTML response hardened.
    Rewritten,
    /// Non-HTML response returned untouched.
    Passthrough,
    /// Origin could not be reached.
    UpstreamError,
    /// Failure inside the edge itself.
    Internal,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Rewritten => "rewritten",
            Outcome::Passthrough => "passthrough",
            Outcome::UpstreamError => "upstream_error",
            Outcome::Internal => "internal",
        }
    }
}

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, outcome: Outcome, start: Instant) {
    metrics::counter!(
        "edge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    metrics::histogram!("edge_request_duration_seconds", "outcome" => outcome.as_str())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_reload() {
    metrics::counter!("edge_config_reloads_total").increment(1);
}
