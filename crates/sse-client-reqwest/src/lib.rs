//! reqwest transport for the SSE client
//!
//! # Example
//!
//! ```rust,ignore
//! use sse_client::{Callbacks, ClientConfig, ConnectionManager};
//! use sse_client_reqwest::ReqwestTransport;
//!
//! let manager = ConnectionManager::open(
//!     "https://example.com/events",
//!     ClientConfig::default(),
//!     ReqwestTransport::new(),
//!     Callbacks::new().on_message(|event| println!("{}", event.data)),
//! )?;
//! ```

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use sse_client::{ConnectRequest, Transport, TransportResponse};
use tracing::debug;

/// [`Transport`] backed by a [`reqwest::Client`]
///
/// Connect timeouts are applied by the connection manager; configure the
/// client only for concerns like proxies or TLS roots.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with a default client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport around an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn connect(&self, request: &ConnectRequest) -> anyhow::Result<TransportResponse> {
        let builder = request
            .headers
            .iter()
            .fold(self.client.get(&request.url), |builder, (name, value)| {
                builder.header(name.as_str(), value.as_str())
            });

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        debug!(url = %request.url, status, content_type = ?content_type, "HTTP response received");

        let body = response
            .bytes_stream()
            .map_err(anyhow::Error::from)
            .boxed();

        Ok(TransportResponse::new(status, content_type, body))
    }

    fn name(&self) -> &'static str {
        "Reqwest"
    }
}
