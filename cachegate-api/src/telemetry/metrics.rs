//! Prometheus Metrics Definitions
//!
//! Defines the gateway metrics with their labels and exposes a /metrics
//! endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use cachegate_core::ObjectAccess;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s, 60s
///
/// PATCH requests can sit waiting for their turn, hence the long tail.
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<CachegateMetrics>> = Lazy::new(CachegateMetrics::new);

/// Container for all gateway metrics.
#[derive(Clone)]
pub struct CachegateMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Token admissions - labels: result (accepted/rejected/cached)
    pub token_validations_total: CounterVec,

    /// Cache lookups - labels: result (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// Multipart part uploads - labels: status
    pub upload_parts_total: CounterVec,

    /// Credential issuance - labels: access, status
    pub credentials_issued_total: CounterVec,
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

impl CachegateMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "cachegate_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "cachegate_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            token_validations_total: register_counter_vec!(
                "cachegate_token_validations_total",
                "Runner token admissions by outcome",
                &["result"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register token_validations_total: {}", e)))?,

            cache_lookups_total: register_counter_vec!(
                "cachegate_cache_lookups_total",
                "Cache lookups by outcome",
                &["result"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_lookups_total: {}", e)))?,

            upload_parts_total: register_counter_vec!(
                "cachegate_upload_parts_total",
                "Multipart part uploads",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register upload_parts_total: {}", e)))?,

            credentials_issued_total: register_counter_vec!(
                "cachegate_credentials_issued_total",
                "Scoped credential requests",
                &["access", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register credentials_issued_total: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_token_validation(&self, result: &str) {
        self.token_validations_total.with_label_values(&[result]).inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    pub fn record_upload_part(&self, success: bool) {
        self.upload_parts_total
            .with_label_values(&[status_label(success)])
            .inc();
    }

    pub fn record_credentials(&self, access: ObjectAccess, success: bool) {
        let access = match access {
            ObjectAccess::Download => "download",
            ObjectAccess::Upload => "upload",
        };
        self.credentials_issued_total
            .with_label_values(&[access, status_label(success)])
            .inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
