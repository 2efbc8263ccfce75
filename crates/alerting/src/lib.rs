//! Alerting Core
//!
//! Turns an authenticated push notification into an upstream alert:
//! - Severity resolution from message priority
//! - Label and annotation construction with fixed precedence
//! - Validity window computation from the configured TTL

mod app;
mod builder;
mod error;
mod extras;
mod message;
mod severity;

pub use app::{app_id_from_name, AppIdentity};
pub use builder::{summary, Alert, AlertBuilder, AlertDefaults, DEFAULT_ALERT_NAME};
pub use error::AlertError;
pub use extras::{extras_annotations, string_at_path, Extras};
pub use message::{InboundMessage, DEFAULT_PRIORITY};
pub use severity::{Severity, SeverityMap};

/// Label keys computed for every alert. These always win over default and per-app labels.
pub mod labels {
    pub const ALERT_NAME: &str = "alertname";
    pub const APP: &str = "app";
    pub const SEVERITY: &str = "severity";
    pub const PRIORITY: &str = "priority";
    pub const FORWARDING_ID: &str = "alertbridge_id";
}

/// Annotation keys written for every alert.
pub mod annotations {
    pub const SUMMARY: &str = "summary";
    pub const DESCRIPTION: &str = "description";
    pub const CONTENT_TYPE: &str = "gotify_content_type";
    pub const CLICK_URL: &str = "gotify_click_url";
    pub const BIG_IMAGE_URL: &str = "gotify_big_image_url";
    pub const ON_RECEIVE_INTENT_URL: &str = "gotify_on_receive_intent_url";
}
