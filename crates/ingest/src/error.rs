//! Ingestion Error Types

use thiserror::Error;

/// Reasons an inbound request is rejected before forwarding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// No token was supplied or it does not belong to a configured app
    #[error("token missing or invalid")]
    Unauthenticated,

    /// Declared content type is neither JSON nor form-encoded
    #[error("unsupported content type: {0:?}")]
    UnsupportedContentType(String),

    /// Body could not be decoded
    #[error("malformed body: {0}")]
    MalformedBody(String),

    /// `message` is absent or blank
    #[error("message is required")]
    MissingMessage,

    /// Priority is not a non-negative integer
    #[error("invalid priority: {0}")]
    InvalidPriority(String),
}
