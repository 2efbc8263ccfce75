//! Error types for alert delivery

use crate::classify::FailureKind;
use crate::context::CancelReason;
use thiserror::Error;

/// Upper bound on the upstream error body kept for diagnostics
pub const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("alertmanager returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("alertmanager request failed ({kind}): {source}")]
    Transport {
        kind: FailureKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("alert delivery stopped: {0}")]
    Cancelled(CancelReason),

    #[error("alertmanager not ready: status {status}")]
    NotReady { status: u16 },

    #[error("encode alerts: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid alertmanager configuration: {0}")]
    InvalidConfiguration(String),
}

impl DeliveryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DeliveryError::Status { status, .. } | DeliveryError::NotReady { status } => {
                FailureKind::UpstreamStatus(*status)
            }
            DeliveryError::Transport { kind, .. } => *kind,
            DeliveryError::Cancelled(_) => FailureKind::Cancelled,
            DeliveryError::Encode(_) | DeliveryError::InvalidConfiguration(_) => FailureKind::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Upstream HTTP status, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Status { status, .. } | DeliveryError::NotReady { status } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeliveryError::Cancelled(_))
    }
}
