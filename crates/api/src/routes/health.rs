//! Liveness, readiness and metrics endpoints

use super::request_context;
use crate::AppState;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use tracing::warn;

const OK_BODY: &str = "ok\n";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";
const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Upper bound for one upstream readiness probe
pub const READY_TIMEOUT: Duration = Duration::from_secs(2);

fn plain(status: StatusCode, body: String) -> Response {
    (status, [(CONTENT_TYPE, PLAIN_TEXT)], body).into_response()
}

pub async fn healthz() -> Response {
    plain(StatusCode::OK, OK_BODY.to_string())
}

/// Ready when the upstream readiness probe answers 200 within [`READY_TIMEOUT`]
pub async fn readyz(State(state): State<AppState>) -> Response {
    let (ctx, _guard) = request_context(READY_TIMEOUT);

    match state.forwarder.client().ready(&ctx).await {
        Ok(()) => plain(StatusCode::OK, OK_BODY.to_string()),
        Err(err) => {
            warn!("Readiness probe failed: {}", err);
            let reason = match err.to_string().trim() {
                "" => "not ready".to_string(),
                reason => reason.to_string(),
            };
            plain(StatusCode::SERVICE_UNAVAILABLE, format!("{reason}\n"))
        }
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, PROMETHEUS_TEXT)],
        state.metrics.render(),
    )
        .into_response()
}
