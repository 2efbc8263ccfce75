//! Validated inbound notification

use crate::extras::Extras;
use serde::{Deserialize, Serialize};

/// Priority assumed when a request does not carry one
pub const DEFAULT_PRIORITY: u32 = 5;

/// A push notification that passed validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message body, trimmed and non-empty
    pub message: String,
    /// Optional title, trimmed; empty when absent
    #[serde(default)]
    pub title: String,
    pub priority: u32,
    /// Opaque client extras, only read through fixed paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Extras>,
}

impl InboundMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            title: String::new(),
            priority: DEFAULT_PRIORITY,
            extras: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_extras(mut self, extras: Extras) -> Self {
        self.extras = Some(extras);
        self
    }
}
