//! Resolved application identity

use crate::severity::SeverityMap;
use std::collections::BTreeMap;

/// Identity of the application that owns a token.
///
/// Built once at startup from configuration and shared read-only between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub name: String,
    /// Deterministic numeric id derived from `name`
    pub id: u32,
    /// Per-app alert name; `None` falls back to the default
    pub alert_name: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// Replaces the default severity map wholesale when set
    pub severity_map: Option<SeverityMap>,
}

impl AppIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: app_id_from_name(&name),
            name,
            alert_name: None,
            labels: BTreeMap::new(),
            severity_map: None,
        }
    }

    /// Set the alert name override. Blank names are treated as unset.
    pub fn with_alert_name(mut self, alert_name: impl AsRef<str>) -> Self {
        let trimmed = alert_name.as_ref().trim();
        self.alert_name = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Set the severity map override. Empty maps are treated as unset.
    pub fn with_severity_map(mut self, severity_map: SeverityMap) -> Self {
        self.severity_map = (!severity_map.is_empty()).then_some(severity_map);
        self
    }
}

/// FNV-1a 32-bit hash of the app name
pub fn app_id_from_name(name: &str) -> u32 {
    const OFFSET: u32 = 2_166_136_261;
    const PRIME: u32 = 16_777_619;

    name.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u32::from(byte)).wrapping_mul(PRIME))
}
