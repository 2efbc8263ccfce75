//! Priority to severity mapping

use crate::error::AlertError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Canonical alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AlertError;

    /// Accepts canonical names plus the `warn` and `crit` aliases, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warning),
            "crit" | "critical" => Ok(Severity::Critical),
            _ => Err(AlertError::InvalidSeverity(s.to_string())),
        }
    }
}

/// Partial mapping from message priority to severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityMap(BTreeMap<u32, Severity>);

impl SeverityMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, priority: u32, severity: Severity) -> Option<Severity> {
        self.0.insert(priority, severity)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Resolve the severity for a priority.
    ///
    /// An exact key wins. Otherwise the largest key below the priority is used,
    /// and when every key is above it, the smallest key. An empty map yields
    /// `Info`; configuration rejects empty default maps so that branch only
    /// guards against bypassed validation.
    pub fn resolve(&self, priority: u32) -> Severity {
        if let Some(severity) = self.0.get(&priority) {
            return *severity;
        }

        self.0
            .range(..=priority)
            .next_back()
            .or_else(|| self.0.first_key_value())
            .map(|(_, severity)| *severity)
            .unwrap_or(Severity::Info)
    }
}

impl FromIterator<(u32, Severity)> for SeverityMap {
    fn from_iter<T: IntoIterator<Item = (u32, Severity)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn map(entries: &[(u32, Severity)]) -> SeverityMap {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_exact_match_wins() {
        let m = map(&[(0, Severity::Info), (5, Severity::Critical)]);
        assert_eq!(m.resolve(5), Severity::Critical);
        assert_eq!(m.resolve(0), Severity::Info);
    }

    #[test]
    fn test_nearest_lower_key() {
        let m = map(&[(0, Severity::Info), (2, Severity::Warning), (5, Severity::Critical)]);
        assert_eq!(m.resolve(3), Severity::Warning);
        assert_eq!(m.resolve(100), Severity::Critical);
    }

    #[test]
    fn test_smallest_key_when_all_above() {
        let m = map(&[(5, Severity::Critical), (10, Severity::Warning)]);
        assert_eq!(m.resolve(1), Severity::Critical);
    }

    #[test]
    fn test_empty_map_falls_back_to_info() {
        assert_eq!(SeverityMap::new().resolve(7), Severity::Info);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!(" crit ".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("Info".parse::<Severity>().unwrap(), Severity::Info);
        assert!("fatal".parse::<Severity>().is_err());
    }

    fn severity_strategy() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Info),
            Just(Severity::Warning),
            Just(Severity::Critical),
        ]
    }

    proptest! {
        #[test]
        fn prop_resolution_follows_exact_then_nearest_below(
            entries in proptest::collection::btree_map(0u32..50, severity_strategy(), 1..8),
            priority in 0u32..60,
        ) {
            let m: SeverityMap = entries.iter().map(|(k, v)| (*k, *v)).collect();
            let resolved = m.resolve(priority);

            let expected = match entries.get(&priority) {
                Some(exact) => *exact,
                None => match entries.keys().filter(|k| **k <= priority).max() {
                    Some(lower) => entries[lower],
                    None => entries[entries.keys().min().unwrap()],
                },
            };
            prop_assert_eq!(resolved, expected);
        }
    }
}
