//! SSE Event types

use serde::{Deserialize, Serialize};

/// Default event type used when a record carries no `event` field
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// A dispatched SSE event
///
/// Produced by the assembler on a blank line and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Last event ID in effect when the event was dispatched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Event type (e.g., "message", "update")
    #[serde(rename = "event")]
    pub event_type: String,

    /// Event data, multiple `data` lines joined with `\n`
    pub data: String,
}

impl Event {
    /// Create an event of the default `message` type
    pub fn message(data: impl Into<String>) -> Self {
        Self::new(DEFAULT_EVENT_TYPE, data)
    }

    /// Create an event with the given type
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: None,
            event_type: event_type.into(),
            data: data.into(),
        }
    }

    /// Set the event ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Iterate over the individual `data` lines of this event
    pub fn data_lines(&self) -> impl Iterator<Item = &str> {
        self.data.split('\n')
    }
}
