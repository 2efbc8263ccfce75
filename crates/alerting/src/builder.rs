//! Alert Builder
//!
//! Converts a validated message into an upstream alert using the process
//! defaults and the owning app's overrides.

use crate::app::AppIdentity;
use crate::error::AlertError;
use crate::extras::extras_annotations;
use crate::message::InboundMessage;
use crate::severity::SeverityMap;
use crate::{annotations as annotation_keys, labels as label_keys};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Alert name used when neither the app nor the defaults provide one
pub const DEFAULT_ALERT_NAME: &str = "AlertbridgeNotification";

/// Maximum summary length (characters) derived from the message body
const SUMMARY_MAX_CHARS: usize = 120;

/// Appended to summaries cut at `SUMMARY_MAX_CHARS`
const TRUNCATION_MARKER: char = '…';

/// Alert in the upstream v2 wire shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Process-wide alert defaults, validated on construction
#[derive(Debug, Clone)]
pub struct AlertDefaults {
    alert_name: String,
    ttl: TimeDelta,
    severity_map: SeverityMap,
    labels: BTreeMap<String, String>,
}

impl AlertDefaults {
    /// Validate and build the defaults.
    ///
    /// A blank `alert_name` falls back to [`DEFAULT_ALERT_NAME`].
    pub fn new(
        alert_name: &str,
        ttl: Duration,
        severity_map: SeverityMap,
        labels: BTreeMap<String, String>,
    ) -> Result<Self, AlertError> {
        if severity_map.is_empty() {
            return Err(AlertError::EmptySeverityMap);
        }
        if ttl.is_zero() {
            return Err(AlertError::NonPositiveTtl);
        }
        let ttl = TimeDelta::from_std(ttl).map_err(|_| AlertError::TtlOutOfRange(ttl))?;

        let alert_name = match alert_name.trim() {
            "" => DEFAULT_ALERT_NAME.to_string(),
            name => name.to_string(),
        };

        Ok(Self {
            alert_name,
            ttl,
            severity_map,
            labels,
        })
    }

    pub fn alert_name(&self) -> &str {
        &self.alert_name
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub fn severity_map(&self) -> &SeverityMap {
        &self.severity_map
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}

/// Builds outbound alerts from inbound messages
#[derive(Debug, Clone)]
pub struct AlertBuilder {
    defaults: AlertDefaults,
}

impl AlertBuilder {
    pub fn new(defaults: AlertDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &AlertDefaults {
        &self.defaults
    }

    /// Build an alert whose validity window starts now
    pub fn build_now(&self, app: &AppIdentity, msg: &InboundMessage, forwarding_id: u64) -> Alert {
        self.build(app, msg, forwarding_id, Utc::now())
    }

    /// Build an alert whose validity window starts at `now`.
    ///
    /// Label precedence is defaults < app < computed.
    pub fn build(
        &self,
        app: &AppIdentity,
        msg: &InboundMessage,
        forwarding_id: u64,
        now: DateTime<Utc>,
    ) -> Alert {
        let severity_map = app
            .severity_map
            .as_ref()
            .unwrap_or(&self.defaults.severity_map);
        let severity = severity_map.resolve(msg.priority);

        let alert_name = app
            .alert_name
            .as_deref()
            .unwrap_or(&self.defaults.alert_name);

        let mut labels = self.defaults.labels.clone();
        labels.extend(app.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        labels.insert(label_keys::ALERT_NAME.to_string(), alert_name.to_string());
        labels.insert(label_keys::APP.to_string(), app.name.clone());
        labels.insert(label_keys::SEVERITY.to_string(), severity.to_string());
        labels.insert(label_keys::PRIORITY.to_string(), msg.priority.to_string());
        labels.insert(label_keys::FORWARDING_ID.to_string(), forwarding_id.to_string());

        let mut annotations = BTreeMap::from([
            (
                annotation_keys::SUMMARY.to_string(),
                summary(&app.name, &msg.title, &msg.message),
            ),
            (annotation_keys::DESCRIPTION.to_string(), msg.message.clone()),
        ]);
        if let Some(extras) = &msg.extras {
            annotations.extend(extras_annotations(extras));
        }

        let ends_at = now
            .checked_add_signed(self.defaults.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        debug!(
            "Built alert {} for app {} (severity: {}, id: {})",
            alert_name, app.name, severity, forwarding_id
        );

        Alert {
            labels,
            annotations,
            starts_at: now,
            ends_at,
        }
    }
}

/// Pick the alert summary.
///
/// The trimmed title wins; otherwise the trimmed message, cut to 120 characters
/// with a trailing marker; otherwise the app name.
pub fn summary(app_name: &str, title: &str, message: &str) -> String {
    let title = title.trim();
    if !title.is_empty() {
        return title.to_string();
    }

    let message = message.trim();
    if message.is_empty() {
        return app_name.to_string();
    }

    match message.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((cut, _)) => {
            let mut truncated = message[..cut].to_string();
            truncated.push(TRUNCATION_MARKER);
            truncated
        }
        None => message.to_string(),
    }
}
