//! Transport trait
//!
//! Implement `Transport` to plug in the HTTP client that opens the streaming
//! request. The connection manager builds the request headers (including
//! `Last-Event-ID`) and interprets the response.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Content type of a valid event stream
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Header carrying the resumption point
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// A streaming request to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Target URL
    pub url: String,
    /// Request headers
    pub headers: BTreeMap<String, String>,
}

impl ConnectRequest {
    /// Get a header value, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The `Last-Event-ID` header, if the request carries one
    pub fn last_event_id(&self) -> Option<&str> {
        self.header(LAST_EVENT_ID_HEADER)
    }
}

/// Body of a streaming response
pub type ByteStream = BoxStream<'static, anyhow::Result<Bytes>>;

/// Response descriptor plus body returned by a transport
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// `Content-Type` header, if present
    pub content_type: Option<String>,
    /// Response body
    pub body: ByteStream,
}

impl TransportResponse {
    /// Create a response
    pub fn new(status: u16, content_type: Option<String>, body: ByteStream) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    /// Whether the content type denotes an event stream (or is absent)
    pub fn is_event_stream(&self) -> bool {
        match &self.content_type {
            None => true,
            Some(content_type) => content_type
                .split(';')
                .next()
                .map(|mime| mime.trim().eq_ignore_ascii_case(EVENT_STREAM_CONTENT_TYPE))
                .unwrap_or(false),
        }
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Trait for the HTTP layer beneath the connection manager
///
/// # Example
///
/// ```rust,ignore
/// use sse_client::{async_trait, ConnectRequest, Transport, TransportResponse};
///
/// struct MyTransport {
///     client: MyHttpClient,
/// }
///
/// #[async_trait]
/// impl Transport for MyTransport {
///     async fn connect(&self, request: &ConnectRequest) -> anyhow::Result<TransportResponse> {
///         let response = self.client.get(&request.url, &request.headers).await?;
///         Ok(TransportResponse::new(
///             response.status(),
///             response.content_type(),
///             Box::pin(response.into_byte_stream()),
///         ))
///     }
///
///     fn name(&self) -> &'static str { "MyTransport" }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a streaming request
    ///
    /// Errors are connectivity failures and are retried by the manager.
    async fn connect(&self, request: &ConnectRequest) -> anyhow::Result<TransportResponse>;

    /// Return the transport name (for logging)
    fn name(&self) -> &'static str;
}
