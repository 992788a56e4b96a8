//! State change — a diagnostic record of one write to the state tree.

use serde::{Deserialize, Serialize};

use crate::time::{Timestamp, now};

/// One write at `path`: what was there before and what replaced it.
///
/// Removals are recorded with `new_value == Value::Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub path: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: serde_json::Value,
    pub timestamp: Timestamp,
}

impl StateChange {
    /// Record a change happening now.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        old_value: Option<serde_json::Value>,
        new_value: serde_json::Value,
    ) -> Self {
        Self {
            path: path.into(),
            old_value,
            new_value,
            timestamp: now(),
        }
    }
}
