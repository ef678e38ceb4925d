//! Client configuration

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assembler::{ParserState, DEFAULT_RECONNECTION_INTERVAL};
use crate::error::{Error, Result};

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager)
///
/// Deserializable from any serde format; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Extra request headers sent on every attempt
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Reconnection interval in milliseconds until the server sends `retry`
    #[serde(default = "default_retry_ms")]
    pub retry_ms: u64,

    /// Last event ID to resume from on the first attempt
    #[serde(default)]
    pub last_event_id: Option<String>,

    /// Status codes after which the client never reconnects
    #[serde(default = "default_non_retry_statuses")]
    pub non_retry_statuses: Vec<u16>,

    /// Timeout for establishing a connection, in milliseconds
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,

    /// Consecutive failed attempts before giving up (None = never)
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
}

fn default_retry_ms() -> u64 {
    millis(DEFAULT_RECONNECTION_INTERVAL)
}

/// Milliseconds in `duration`, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_non_retry_statuses() -> Vec<u16> {
    vec![204]
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            retry_ms: default_retry_ms(),
            last_event_id: None,
            non_retry_statuses: default_non_retry_statuses(),
            connect_timeout_ms: None,
            max_reconnect_attempts: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults overridden by environment variables
    ///
    /// Recognized: `SSE_RETRY_MS`, `SSE_CONNECT_TIMEOUT_MS`,
    /// `SSE_MAX_RECONNECT_ATTEMPTS`, `SSE_LAST_EVENT_ID`.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup, then validate
    ///
    /// Values that fail to parse are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(retry) = lookup("SSE_RETRY_MS").and_then(|v| v.parse().ok()) {
            self.retry_ms = retry;
        }
        if let Some(timeout) = lookup("SSE_CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.connect_timeout_ms = Some(timeout);
        }
        if let Some(max) = lookup("SSE_MAX_RECONNECT_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.max_reconnect_attempts = Some(max);
        }
        if let Some(id) = lookup("SSE_LAST_EVENT_ID") {
            self.last_event_id = Some(id);
        }

        self.validate()?;
        Ok(self)
    }

    /// Add a request header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the default reconnection interval
    pub fn retry(mut self, interval: Duration) -> Self {
        self.retry_ms = millis(interval);
        self
    }

    /// Set the last event ID to resume from
    pub fn last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = Some(id.into());
        self
    }

    /// Replace the set of non-retryable status codes
    pub fn non_retry_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.non_retry_statuses = statuses.into_iter().collect();
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(millis(timeout));
        self
    }

    /// Limit consecutive reconnection attempts
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Default reconnection interval as a [`Duration`]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }

    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout_duration(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Whether a response with this status must not be retried
    pub fn is_non_retry_status(&self, status: u16) -> bool {
        self.non_retry_statuses.contains(&status)
    }

    /// Parser state for the first connection attempt
    pub fn initial_state(&self) -> ParserState {
        ParserState {
            last_event_id: self.last_event_id.clone().filter(|id| !id.is_empty()),
            reconnection_interval: self.retry_interval(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.retry_ms == 0 {
            return Err(Error::Config("Reconnection interval must be > 0".to_string()));
        }
        if self.connect_timeout_ms == Some(0) {
            return Err(Error::Config("Connect timeout must be > 0".to_string()));
        }
        for (name, value) in &self.headers {
            if name.is_empty() || !name.bytes().all(is_header_name_byte) {
                return Err(Error::Config(format!("Invalid header name: {name:?}")));
            }
            if value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0) {
                return Err(Error::Config(format!("Invalid value for header {name}")));
            }
        }
        if let Some(id) = &self.last_event_id {
            if id.contains(['\0', '\r', '\n']) {
                return Err(Error::Config("Invalid last event ID".to_string()));
            }
        }
        Ok(())
    }
}

fn is_header_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
