//! Well-known client extras mapped to annotations

use crate::annotations;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Client-supplied extras: a string-keyed tree of JSON values
pub type Extras = Map<String, Value>;

/// Fixed extras paths and the annotation each one feeds
const EXTRAS_PATHS: [(&[&str], &str); 4] = [
    (&["client::display", "contentType"], annotations::CONTENT_TYPE),
    (&["client::notification", "click", "url"], annotations::CLICK_URL),
    (&["client::notification", "bigImageUrl"], annotations::BIG_IMAGE_URL),
    (
        &["android::action", "onReceive", "intentUrl"],
        annotations::ON_RECEIVE_INTENT_URL,
    ),
];

/// Extract the well-known extras as annotations.
///
/// Unknown extras are ignored. A path contributes only when it ends in a
/// non-blank string; a missing or mis-shaped node skips just that path.
pub fn extras_annotations(extras: &Extras) -> BTreeMap<String, String> {
    EXTRAS_PATHS
        .iter()
        .filter_map(|(path, annotation)| {
            string_at_path(extras, path).map(|value| (annotation.to_string(), value))
        })
        .collect()
}

/// Walk `path` through nested objects and return the trimmed string at its end
pub fn string_at_path(extras: &Extras, path: &[&str]) -> Option<String> {
    let (first, rest) = path.split_first()?;
    let mut current = extras.get(*first)?;

    for key in rest {
        current = current.as_object()?.get(*key)?;
    }

    let trimmed = current.as_str()?.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
