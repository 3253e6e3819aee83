//! Metrics collection and exposition.
//!
//! # Metrics
//! - `confd_job_outcome_total` (counter): job results by src, dest, code
//! - `confd_fetch_errors_total` (counter): failed endpoint attempts
//! - `gateway_requests_total` (counter): requests by backend, method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_policy_denied_total` (counter): denials by backend and code
//! - `gateway_audit_dropped_total` (counter): audit records lost to overflow

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Instant;

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder once per process.
///
/// With `listen` set, the exporter also serves its own scrape endpoint.
/// Must be called inside a Tokio runtime.
pub fn init_metrics(listen: Option<SocketAddr>) -> Option<PrometheusHandle> {
    HANDLE.get_or_init(|| install(listen)).clone()
}

fn install(listen: Option<SocketAddr>) -> Option<PrometheusHandle> {
    let builder = match PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("gateway_request_duration_seconds".to_string()),
        LATENCY_BUCKETS,
    ) {
        Ok(builder) => builder,
        Err(e) => {
            tracing::error!(error = %e, "Invalid metrics bucket configuration");
            return None;
        }
    };

    let builder = match listen {
        Some(addr) => builder.with_http_listener(addr),
        None => builder,
    };

    let (recorder, exporter) = match builder.build() {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build metrics exporter");
            return None;
        }
    };

    let handle = recorder.handle();
    if ::metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Metrics recorder already installed");
        return None;
    }

    tokio::spawn(async move {
        if exporter.await.is_err() {
            tracing::error!("Metrics exporter stopped");
        }
    });

    if let Some(addr) = listen {
        tracing::info!(address = %addr, "Metrics exporter listening");
    }
    Some(handle)
}

/// Record one job iteration outcome.
pub fn record_job_outcome(src: &str, dest: &str, code: u8) {
    ::metrics::counter!(
        "confd_job_outcome_total",
        "src" => src.to_string(),
        "dest" => dest.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
}

/// Record a failed attempt against one endpoint.
pub fn record_fetch_error(endpoint: &str) {
    ::metrics::counter!("confd_fetch_errors_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record a completed gateway request.
pub fn record_request(backend: &str, method: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "backend" => backend.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    ::metrics::histogram!(
        "gateway_request_duration_seconds",
        "backend" => backend.to_string(),
        "method" => method.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_policy_denied(backend: &str, code: u16) {
    ::metrics::counter!(
        "gateway_policy_denied_total",
        "backend" => backend.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
}

pub fn record_audit_dropped() {
    ::metrics::counter!("gateway_audit_dropped_total").increment(1);
}
