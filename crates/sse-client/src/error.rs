//! Error types for the SSE client

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the connection manager
///
/// Parsing never produces an error: malformed fields are dropped while the
/// stream is read. Only connection-level failures end up here.
#[derive(Error, Debug)]
pub enum Error {
    /// Connectivity or body read failure reported by the transport
    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),

    /// The server answered with a status that is not a valid event stream
    #[error("Invalid status code: {0}")]
    InvalidStatus(u16),

    /// The server asked the client not to reconnect (204 by default)
    #[error("Server requested no reconnection (status {0})")]
    NoContent(u16),

    /// A 2xx response that is not `text/event-stream`
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Connecting took longer than the configured timeout
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the manager reconnects after this error by default.
    ///
    /// The status codes listed in
    /// [`ClientConfig::non_retry_statuses`](crate::ClientConfig) are mapped to
    /// [`Error::NoContent`] before this is consulted.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) | Error::InvalidStatus(_) | Error::Timeout(_) => true,
            Error::NoContent(_) | Error::InvalidContentType(_) | Error::Config(_) => false,
        }
    }
}
