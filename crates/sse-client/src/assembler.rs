//! Event assembly from classified lines

use std::time::Duration;

use crate::event::{Event, DEFAULT_EVENT_TYPE};
use crate::field::{FieldEvent, FieldName};

/// Reconnection interval used until a `retry` field says otherwise
pub const DEFAULT_RECONNECTION_INTERVAL: Duration = Duration::from_millis(3000);

/// State that outlives a single event and a single connection
///
/// The connection manager carries this value from one connection attempt to
/// the next; nothing else crosses that boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserState {
    /// Last event ID seen on the stream, sent back as `Last-Event-ID`
    pub last_event_id: Option<String>,
    /// Delay before the next reconnection attempt
    pub reconnection_interval: Duration,
}

impl ParserState {
    /// Create a state with the given reconnection interval and no event ID
    pub fn new(reconnection_interval: Duration) -> Self {
        Self {
            last_event_id: None,
            reconnection_interval,
        }
    }

    /// Set the initial last event ID
    pub fn with_last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = Some(id.into());
        self
    }
}

impl Default for ParserState {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECTION_INTERVAL)
    }
}

/// Accumulates fields into the pending event
#[derive(Debug, Default)]
pub struct EventAssembler {
    state: ParserState,
    event_type: String,
    data: String,
}

impl EventAssembler {
    /// Create an assembler with default state
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an assembler that resumes from an earlier state
    pub fn with_state(state: ParserState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Persistent state (last event ID, reconnection interval)
    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Apply one classified line; returns an event on a dispatch boundary
    ///
    /// An empty `id` clears the last event ID, so a later reconnect sends no
    /// `Last-Event-ID`.
    pub fn apply(&mut self, field: FieldEvent) -> Option<Event> {
        match field {
            FieldEvent::Field {
                name: FieldName::Data,
                value,
            } => {
                self.data.push_str(&value);
                self.data.push('\n');
            }
            FieldEvent::Field {
                name: FieldName::Id,
                value,
            } => {
                if !value.contains('\0') {
                    self.state.last_event_id = (!value.is_empty()).then_some(value);
                }
            }
            FieldEvent::Field {
                name: FieldName::Event,
                value,
            } => {
                self.event_type = value;
            }
            FieldEvent::Field {
                name: FieldName::Retry,
                value,
            } => {
                if let Some(millis) = parse_retry(&value) {
                    self.state.reconnection_interval = Duration::from_millis(millis);
                }
            }
            FieldEvent::DispatchBoundary => return self.dispatch(),
            FieldEvent::Comment(_) | FieldEvent::Unknown { .. } => {}
        }
        None
    }

    /// Discard the in-progress event, keeping persistent state
    pub fn reset_pending(&mut self) {
        self.event_type.clear();
        self.data.clear();
    }

    fn dispatch(&mut self) -> Option<Event> {
        let mut data = std::mem::take(&mut self.data);
        let event_type = std::mem::take(&mut self.event_type);

        if data.is_empty() {
            return None;
        }
        data.pop();

        Some(Event {
            id: self.state.last_event_id.clone(),
            event_type: if event_type.is_empty() {
                DEFAULT_EVENT_TYPE.to_string()
            } else {
                event_type
            },
            data,
        })
    }
}

fn parse_retry(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
