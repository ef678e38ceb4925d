//! Classification of a single SSE line

use std::fmt;

/// Field names understood by the assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldName {
    /// `id`
    Id,
    /// `event`
    Event,
    /// `data`
    Data,
    /// `retry`
    Retry,
}

impl FieldName {
    fn from_bytes(name: &[u8]) -> Option<Self> {
        match name {
            b"id" => Some(Self::Id),
            b"event" => Some(Self::Event),
            b"data" => Some(Self::Data),
            b"retry" => Some(Self::Retry),
            _ => None,
        }
    }

    /// The field name as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Event => "event",
            Self::Data => "data",
            Self::Retry => "retry",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a line means to the event assembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEvent {
    /// Line starting with `:`; the text after the colon
    Comment(String),
    /// A recognized field
    Field {
        /// Field name
        name: FieldName,
        /// Value with one leading space removed
        value: String,
    },
    /// Empty line, ends the current record
    DispatchBoundary,
    /// Any other field name, ignored for forward compatibility
    Unknown {
        /// The unrecognized name
        name: String,
    },
}

/// Classify one line (without its terminator)
///
/// Invalid UTF-8 is decoded with replacement characters; no line is ever
/// rejected.
pub fn classify(line: &[u8]) -> FieldEvent {
    if line.is_empty() {
        return FieldEvent::DispatchBoundary;
    }

    let (name, value) = match memchr::memchr(b':', line) {
        Some(0) => return FieldEvent::Comment(decode(&line[1..])),
        Some(colon) => {
            let value = &line[colon + 1..];
            let value = value.strip_prefix(b" ").unwrap_or(value);
            (&line[..colon], value)
        }
        None => (line, &[][..]),
    };

    match FieldName::from_bytes(name) {
        Some(name) => FieldEvent::Field {
            name,
            value: decode(value),
        },
        None => FieldEvent::Unknown { name: decode(name) },
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
