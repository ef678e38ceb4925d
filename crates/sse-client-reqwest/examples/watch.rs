//! Print every event from an SSE endpoint until Ctrl-C
//!
//! ```text
//! SSE_URL=http://localhost:8080/sse RUST_LOG=sse_client=debug cargo run --example watch
//! ```
//!
//! The URL may also be passed as the first argument. Client settings are read
//! from `SSE_RETRY_MS`, `SSE_CONNECT_TIMEOUT_MS`, `SSE_MAX_RECONNECT_ATTEMPTS`
//! and `SSE_LAST_EVENT_ID`.

use anyhow::Context;
use futures::StreamExt;
use sse_client::{Callbacks, ClientConfig, ConnectionManager};
use sse_client_reqwest::ReqwestTransport;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SSE_URL").ok())
        .context("usage: watch <url> (or set SSE_URL)")?;
    let config = ClientConfig::from_env()?;

    let callbacks = Callbacks::new()
        .on_open(|| tracing::info!("Stream open"))
        .on_message(|event| {
            tracing::info!(
                id = ?event.id,
                event_type = %event.event_type,
                data = %event.data,
                "Event"
            );
        })
        .on_error(|err| match err {
            Some(err) => tracing::warn!(error = %err, "Stream failed"),
            None => tracing::info!("Stream ended"),
        });

    let manager = ConnectionManager::open(url, config, ReqwestTransport::new(), callbacks)?;

    let mut states = manager.state_stream();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                manager.close();
                break;
            }
            state = states.next() => match state {
                Some(state) if state.is_terminal() => {
                    tracing::info!(state = ?state, "Connection closed");
                    break;
                }
                Some(state) => tracing::debug!(state = ?state, "Connection state"),
                None => break,
            },
        }
    }

    let last_event_id = manager.parser_state().last_event_id;
    tracing::info!(last_event_id = ?last_event_id, "Done");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sse_client=info,watch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
