//! Push message parsing for JSON and form-encoded bodies

use crate::error::IngestError;
use alerting::{Extras, InboundMessage, DEFAULT_PRIORITY};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Accepted request encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Json,
    Form,
}

impl MediaType {
    /// Resolve the body encoding from a `Content-Type` header value.
    ///
    /// An absent header is treated as form-encoded for client compatibility.
    /// Media type parameters such as `charset` are ignored.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self, IngestError> {
        let Some(raw) = content_type.filter(|value| !value.is_empty()) else {
            return Ok(MediaType::Form);
        };

        let essence = raw.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("application/json") {
            Ok(MediaType::Json)
        } else if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            Ok(MediaType::Form)
        } else {
            Err(IngestError::UnsupportedContentType(essence.to_ascii_lowercase()))
        }
    }
}

/// JSON request body. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct JsonPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    extras: Option<Extras>,
}

/// Parse and validate a push message.
///
/// `query` is the raw query string; for form requests its pairs are merged
/// with the body's, body values taking precedence.
pub fn parse_message(
    content_type: Option<&str>,
    query: Option<&str>,
    body: &[u8],
) -> Result<InboundMessage, IngestError> {
    match MediaType::from_content_type(content_type)? {
        MediaType::Json => parse_json(body),
        MediaType::Form => parse_form(query, body),
    }
}

fn parse_json(body: &[u8]) -> Result<InboundMessage, IngestError> {
    let payload: JsonPayload = serde_json::from_slice(body).map_err(|err| {
        debug!("Rejected JSON body: {}", err);
        IngestError::MalformedBody(format!("decode json: {err}"))
    })?;

    let message = required_message(payload.message.as_deref().unwrap_or_default())?;
    let priority = match payload.priority {
        Some(raw) => checked_priority(raw)?,
        None => DEFAULT_PRIORITY,
    };

    Ok(InboundMessage {
        message,
        title: payload.title.unwrap_or_default().trim().to_string(),
        priority,
        extras: payload.extras,
    })
}

fn parse_form(query: Option<&str>, body: &[u8]) -> Result<InboundMessage, IngestError> {
    let body_pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
        .map_err(|err| IngestError::MalformedBody(format!("decode form: {err}")))?;
    let query_pairs: Vec<(String, String)> = match query {
        Some(query) => serde_urlencoded::from_str(query)
            .map_err(|err| IngestError::MalformedBody(format!("decode query: {err}")))?,
        None => Vec::new(),
    };

    let mut fields: HashMap<String, String> = HashMap::new();
    for (key, value) in body_pairs.into_iter().chain(query_pairs) {
        fields.entry(key).or_insert(value);
    }

    let field = |name: &str| fields.get(name).map(|v| v.trim()).unwrap_or_default();

    let priority = match field("priority") {
        "" => DEFAULT_PRIORITY,
        raw => {
            let parsed = raw
                .parse::<i64>()
                .map_err(|_| IngestError::InvalidPriority(format!("{raw:?}")))?;
            checked_priority(parsed)?
        }
    };
    let message = required_message(field("message"))?;

    Ok(InboundMessage {
        message,
        title: field("title").to_string(),
        priority,
        extras: None,
    })
}

fn required_message(raw: &str) -> Result<String, IngestError> {
    match raw.trim() {
        "" => Err(IngestError::MissingMessage),
        message => Ok(message.to_string()),
    }
}

fn checked_priority(raw: i64) -> Result<u32, IngestError> {
    u32::try_from(raw).map_err(|_| IngestError::InvalidPriority(raw.to_string()))
}
