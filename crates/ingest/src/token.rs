//! Token extraction

use http::header::AUTHORIZATION;
use http::HeaderMap;

/// Dedicated token header (checked first)
pub const TOKEN_HEADER: &str = "x-gotify-key";

/// Token query parameter (checked second)
pub const TOKEN_QUERY_PARAM: &str = "token";

const BEARER_PREFIX: &str = "bearer ";

/// Extract the app token from a request.
///
/// Sources are tried in order: the token header, the `token` query parameter,
/// then `Authorization: Bearer <token>`. The first non-blank value wins.
pub fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    header_token(headers)
        .or_else(|| query.and_then(query_token))
        .or_else(|| bearer_token(headers))
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(TOKEN_HEADER)?.to_str().ok()?.trim();
    non_blank(value)
}

fn query_token(query: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).ok()?;
    pairs
        .into_iter()
        .find(|(key, _)| key == TOKEN_QUERY_PARAM)
        .and_then(|(_, value)| non_blank(value.trim()))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let prefix = value.get(..BEARER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    non_blank(value[BEARER_PREFIX.len()..].trim())
}

fn non_blank(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
