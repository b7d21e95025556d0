//! Prometheus metrics.
//!
//! Recording functions are cheap no-ops until [`init`] installs the
//! global recorder.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder (once per process) and return its handle.
///
/// Returns `None` if another recorder was already installed.
pub fn init() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Prometheus recorder not installed: {}", e);
                None
            }
        })
        .clone()
}

pub fn record_request(endpoint: &'static str, status: u16) {
    counter!(
        "streamscout_requests_total",
        "endpoint" => endpoint,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_duration(endpoint: &'static str, start: Instant) {
    histogram!("streamscout_request_duration_seconds", "endpoint" => endpoint)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("streamscout_cache_lookups_total", "result" => result).increment(1);
}

/// `outcome` is one of `found`, `timeout` or `driver_error`.
pub fn record_resolution(outcome: &'static str, start: Instant) {
    counter!("streamscout_resolutions_total", "outcome" => outcome).increment(1);
    histogram!("streamscout_resolution_duration_seconds").record(start.elapsed().as_secs_f64());
}
