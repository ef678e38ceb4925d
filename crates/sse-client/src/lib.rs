//! # SSE Client
//!
//! An incremental Server-Sent Events (SSE) parser and a reconnecting
//! connection manager.
//!
//! ## Features
//!
//! - **Incremental Parsing**: Feed bytes in chunks of any size; `LF`, `CR` and `CRLF`
//!   line endings are handled even when a `CRLF` is split across chunks
//! - **Pluggable Transport**: Implement `Transport` to use any HTTP client
//! - **Automatic Reconnection**: Honors `retry` fields and resumes with `Last-Event-ID`
//! - **Callback or Pull**: Register callbacks on a `ConnectionManager`, or drive an
//!   `EventParser` / `EventStream` yourself
//!
//! ## Pull Mode
//!
//! ```rust
//! use sse_client::{Drained, EventParser};
//!
//! let (mut parser, mut drain) = EventParser::new();
//! parser.feed(b"id: 1\nevent: update\nda");
//! parser.feed(b"ta: hello\n\n");
//!
//! match drain.try_drain_next() {
//!     Drained::Event(event) => {
//!         assert_eq!(event.id.as_deref(), Some("1"));
//!         assert_eq!(event.event_type, "update");
//!         assert_eq!(event.data, "hello");
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```
//!
//! ## Callback Mode
//!
//! ```rust,ignore
//! use sse_client::{Callbacks, ClientConfig, ConnectionManager};
//! use sse_client_reqwest::ReqwestTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = ConnectionManager::open(
//!         "https://example.com/events",
//!         ClientConfig::from_env()?,
//!         ReqwestTransport::new(),
//!         Callbacks::new()
//!             .on_open(|| println!("open"))
//!             .on_message(|event| println!("{}: {}", event.event_type, event.data))
//!             .on_error(|err| println!("closed: {err:?}")),
//!     )?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     manager.close();
//!     Ok(())
//! }
//! ```

mod assembler;
mod config;
mod error;
mod event;
pub mod field;
pub mod line;
mod manager;
mod parser;
mod queue;
pub mod transport;

// Re-exports
pub use assembler::{EventAssembler, ParserState, DEFAULT_RECONNECTION_INTERVAL};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use event::{Event, DEFAULT_EVENT_TYPE};
pub use field::{classify, FieldEvent, FieldName};
pub use line::LineBuffer;
pub use manager::{
    Callbacks, CloseReason, ConnectionManager, ConnectionState, ErrorCallback, MessageCallback,
    OpenCallback,
};
pub use parser::{EventParser, EventStream};
pub use queue::{event_queue, Drained, EventDrain, EventQueue};
pub use transport::{ByteStream, ConnectRequest, Transport, TransportResponse};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use bytes::Bytes;
