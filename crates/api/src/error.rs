//! HTTP error mapping

use crate::forwarder::ForwardError;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ingest::IngestError;
use serde_json::json;
use thiserror::Error;

/// Every failure a request can end in, each with exactly one status and body
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("token missing or invalid")]
    Unauthenticated,

    #[error("{0}")]
    InvalidRequest(IngestError),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("read request body: {0}")]
    UnreadableBody(String),

    #[error("upstream alertmanager request failed")]
    Upstream(#[source] ForwardError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::FORBIDDEN,
            ApiError::InvalidRequest(_) | ApiError::UnreadableBody(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Unauthenticated => ApiError::Unauthenticated,
            other => ApiError::InvalidRequest(other),
        }
    }
}

impl From<ForwardError> for ApiError {
    fn from(err: ForwardError) -> Self {
        ApiError::Upstream(err)
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::UnreadableBody(rejection.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Display never includes upstream detail; that only goes to the log.
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
