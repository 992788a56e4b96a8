//! Event — an immutable record of a publish on the event bus.

use serde::{Deserialize, Serialize};

use crate::id::EventId;
use crate::time::{Timestamp, now};

/// A single publish: the topic, its payload and when it happened.
///
/// Every `emit` produces one `Event`; listeners receive it by reference and
/// the bus keeps the most recent ones as diagnostic history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            topic: topic.into(),
            payload,
            timestamp: now(),
        }
    }

    /// Whether the topic starts with `prefix` (empty prefix matches all).
    #[must_use]
    pub fn topic_starts_with(&self, prefix: &str) -> bool {
        self.topic.starts_with(prefix)
    }
}
