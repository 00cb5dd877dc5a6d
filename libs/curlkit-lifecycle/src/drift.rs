//! Drift detection between two observations of the same remote state.
//!
//! Bodies are compared after [`sanitize`]: JSON objects lose the ignored
//! top-level fields and are re-serialized with keys sorted at every level,
//! anything else is compared verbatim.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LifecycleError;

/// Remove `ignored_fields` from a JSON object body and canonicalize it.
///
/// An empty body stays empty; bodies that are not a JSON object are returned
/// unchanged.
///
/// # Errors
/// Returns `LifecycleError::Sanitize` if the filtered object cannot be
/// serialized again.
pub fn sanitize<S: AsRef<str>>(body: &str, ignored_fields: &[S]) -> Result<String, LifecycleError> {
    if body.is_empty() {
        return Ok(String::new());
    }
    let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(body) else {
        return Ok(body.to_owned());
    };
    for field in ignored_fields {
        object.remove(field.as_ref());
    }
    serde_json::to_string(&canonical(Value::Object(object))).map_err(LifecycleError::Sanitize)
}

/// Rebuild `value` with object keys in sorted order at every depth.
fn canonical(value: Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(String, Value)> = object.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonical(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical).collect()),
        other => other,
    }
}

/// Whether two sanitized bodies differ.
#[must_use]
pub fn has_drifted(old: &str, new: &str) -> bool {
    old != new
}

/// Marker that changes whenever drift is detected, forcing the host to react.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriftMarker(String);

impl DriftMarker {
    pub const INITIAL: &'static str = "initial";

    #[must_use]
    pub fn initial() -> Self {
        Self(Self::INITIAL.to_owned())
    }

    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.0 == Self::INITIAL
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Detection time, if this is a timestamp marker.
    #[must_use]
    pub fn detected_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// A timestamp marker for "now", strictly after any earlier timestamp.
    fn detected_after(previous: Option<&Self>) -> Self {
        let mut now = Utc::now();
        if let Some(earlier) = previous.and_then(Self::detected_at)
            && now <= earlier
        {
            now = earlier + TimeDelta::nanoseconds(1);
        }
        Self(now.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }
}

impl fmt::Display for DriftMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DriftMarker {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Marker to store after a read.
///
/// Drift produces a fresh timestamp; otherwise the previous marker is kept,
/// or `"initial"` assigned when there was none.
#[must_use]
pub fn next_marker(previous: Option<&DriftMarker>, drifted: bool) -> DriftMarker {
    if drifted {
        DriftMarker::detected_after(previous)
    } else {
        previous.cloned().unwrap_or_else(DriftMarker::initial)
    }
}
