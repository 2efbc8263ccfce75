//! Prometheus metrics
//!
//! Metric names and label sets are fixed. The request path label is the
//! matched route template, so unknown paths cannot grow the series count.

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

pub const HTTP_REQUESTS_TOTAL: &str = "alertbridge_http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "alertbridge_http_request_duration_seconds";
pub const FORWARDED_ALERTS_TOTAL: &str = "alertbridge_forwarded_alerts_total";
pub const UPSTREAM_FAILURES_TOTAL: &str = "alertbridge_upstream_failures_total";

/// Path label for requests that matched no route
pub const UNMATCHED_PATH: &str = "other";

const DURATION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("build prometheus recorder: {0}")]
    Build(#[from] BuildError),

    #[error("a different metrics recorder is already installed")]
    RecorderTaken,
}

/// Install the process-wide Prometheus recorder.
///
/// Repeated calls return the handle of the recorder installed first.
pub fn install() -> Result<PrometheusHandle, MetricsError> {
    let mut slot = HANDLE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }

    let recorder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            &DURATION_BUCKETS,
        )?
        .build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|_| MetricsError::RecorderTaken)?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests handled.");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "HTTP request duration in seconds."
    );
    describe_counter!(
        FORWARDED_ALERTS_TOTAL,
        "Total number of alerts successfully forwarded to Alertmanager."
    );
    describe_counter!(
        UPSTREAM_FAILURES_TOTAL,
        "Total number of failures when calling upstream Alertmanager."
    );

    *slot = Some(handle.clone());
    Ok(handle)
}

pub fn record_forwarded(app: &str) {
    counter!(FORWARDED_ALERTS_TOTAL, "app" => app.to_string()).increment(1);
}

pub fn record_upstream_failure(app: &str) {
    counter!(UPSTREAM_FAILURES_TOTAL, "app" => app.to_string()).increment(1);
}

pub fn record_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    counter!(HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, &labels).record(elapsed.as_secs_f64());
}

/// Middleware that logs and counts every request
pub async fn track_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string());
    let raw_path = request.uri().path().to_string();

    let response = next.run(request).await;

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    info!(
        method = %method,
        path = %raw_path,
        status,
        duration_ms = elapsed.as_millis() as u64,
        "http request"
    );
    record_request(method.as_str(), &path, status, elapsed);

    response
}
