//! Push message endpoint

use super::request_context;
use crate::error::ApiError;
use crate::AppState;
use alerting::Extras;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use chrono::{DateTime, Utc};
use ingest::{parse_message, IngestError};
use serde::{Deserialize, Serialize};

/// Acknowledgement returned for a forwarded message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAck {
    pub id: u64,
    pub appid: u32,
    pub message: String,
    pub title: String,
    pub priority: u32,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Extras>,
}

/// `POST /message`
///
/// The caller is authenticated before the body is read.
pub async fn post_message(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<MessageAck>, ApiError> {
    let app = state
        .registry
        .authenticate(request.headers(), request.uri().query())?;

    let content_type = match request.headers().get(CONTENT_TYPE) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| IngestError::UnsupportedContentType("non-ascii header value".to_string()))?
                .to_string(),
        ),
        None => None,
    };
    let query = request.uri().query().map(str::to_string);

    let body = Bytes::from_request(request, &state).await?;
    let msg = parse_message(content_type.as_deref(), query.as_deref(), &body)?;

    let (ctx, _guard) = request_context(state.request_timeout);
    let forwarded = state.forwarder.forward(&app, &msg, &ctx).await?;

    Ok(Json(MessageAck {
        id: forwarded.id,
        appid: app.id,
        message: msg.message,
        title: msg.title,
        priority: msg.priority,
        date: Utc::now(),
        extras: msg.extras,
    }))
}
