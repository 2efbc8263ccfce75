//! Alerting Error Types

use thiserror::Error;

/// Errors raised while building alert defaults or parsing severities
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertError {
    /// Severity text is not one of the accepted names or aliases
    #[error("invalid severity {0:?} (allowed: info, warning, critical)")]
    InvalidSeverity(String),

    /// The default severity map must have at least one entry
    #[error("default severity map is required and must be non-empty")]
    EmptySeverityMap,

    /// Alerts need a positive validity window
    #[error("ttl must be > 0")]
    NonPositiveTtl,

    /// TTL does not fit in a calendar duration
    #[error("ttl {0:?} is out of range")]
    TtlOutOfRange(std::time::Duration),
}
