//! Observability Metrics
//!
//! Prometheus metrics endpoint for monitoring.

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::ServerError;

/// Global Prometheus handle
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize metrics recorder
///
/// Must be called once at startup before recording any metrics.
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    register_default_metrics();

    METRICS_HANDLE.get_or_init(|| handle.clone());
    Ok(handle)
}

/// Get the global metrics handle
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Register default application metrics
fn register_default_metrics() {
    // Request metrics
    counter!("narrator_requests_total", "endpoint" => "manifest").absolute(0);
    counter!("narrator_requests_total", "endpoint" => "chunk").absolute(0);
    counter!("narrator_requests_total", "endpoint" => "reference").absolute(0);

    // Served audio
    counter!("narrator_chunks_served_total", "fallback" => "false").absolute(0);
    counter!("narrator_chunks_served_total", "fallback" => "true").absolute(0);
    histogram!("narrator_manifest_chunks").record(0.0);

    // Synthesis metrics, recorded by the pipeline
    counter!("narrator_synthesis_fallbacks_total").absolute(0);
    counter!("narrator_synthesis_throttled_total", "reason" => "window_exhausted").absolute(0);
    counter!("narrator_synthesis_throttled_total", "reason" => "too_soon").absolute(0);
    histogram!("narrator_synthesis_duration_seconds").record(0.0);
    histogram!("narrator_rate_limit_wait_seconds").record(0.0);

    // Error metrics
    counter!("narrator_errors_total", "type" => "invalid_request").absolute(0);
    counter!("narrator_errors_total", "type" => "not_found").absolute(0);
    counter!("narrator_errors_total", "type" => "upstream_failure").absolute(0);
}

/// Record request to endpoint
pub fn record_request(endpoint: &'static str) {
    counter!("narrator_requests_total", "endpoint" => endpoint).increment(1);
}

/// Record one chunk of audio served
pub fn record_chunk_served(fallback: bool) {
    let label = if fallback { "true" } else { "false" };
    counter!("narrator_chunks_served_total", "fallback" => label).increment(1);
}

/// Record the size of a manifest handed out
pub fn record_manifest_chunks(chunks: usize) {
    histogram!("narrator_manifest_chunks").record(chunks as f64);
}

/// Record error by type
pub fn record_error(error_type: &'static str) {
    counter!("narrator_errors_total", "type" => error_type).increment(1);
}

/// Metrics endpoint handler
///
/// Returns Prometheus-formatted metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    match get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}
