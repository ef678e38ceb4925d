//! Connection Manager for a reconnecting SSE connection
//!
//! A single actor task owns the transport connection and every state
//! transition. Handles talk to it only through a cancellation token and
//! observe it through watch channels.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::assembler::ParserState;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::parser::EventParser;
use crate::transport::{
    ConnectRequest, Transport, TransportResponse, EVENT_STREAM_CONTENT_TYPE, LAST_EVENT_ID_HEADER,
};

/// Callback invoked once per successful connection
pub type OpenCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback invoked once per dispatched event
pub type MessageCallback = Arc<dyn Fn(Event) + Send + Sync>;

/// Callback invoked when a connection ends; `None` means a clean close
pub type ErrorCallback = Arc<dyn Fn(Option<&Error>) + Send + Sync>;

/// Lifecycle callbacks
#[derive(Clone, Default)]
pub struct Callbacks {
    on_open: Option<OpenCallback>,
    on_message: Option<MessageCallback>,
    on_error: Option<ErrorCallback>,
}

impl Callbacks {
    /// Create an empty set of callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the open callback
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_open = Some(Arc::new(f));
        self
    }

    /// Set the message callback
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(f));
        self
    }

    /// Set the error callback
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Error>) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }
}

/// Why the connection is closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called
    Cancelled,
    /// The server answered in a way that forbids reconnecting
    NonRetryable,
    /// The configured reconnection attempts are used up
    RetriesExhausted,
    /// A callback panicked; no further callbacks are invoked
    CallbackPanicked,
    /// Waiting `delay` before the next attempt
    Reconnecting {
        /// Delay before reconnecting
        delay: Duration,
    },
}

impl CloseReason {
    /// Whether the manager will never connect again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Reconnecting { .. })
    }
}

/// Connection state machine states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, no attempt made yet
    Idle,
    /// Opening the streaming request
    Connecting {
        /// Reconnection attempts since the last successful open
        attempt: u32,
    },
    /// Receiving events
    Open,
    /// Tearing down after a close request
    Closing,
    /// Not connected
    Closed(CloseReason),
}

impl ConnectionState {
    /// Returns `true` if the connection is actively streaming
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if the connection is closed for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed(reason) if reason.is_terminal())
    }
}

/// Serializes callbacks against `close()`
///
/// `close()` from another thread waits until a running callback returns.
/// From inside a callback (same thread) it returns at once; the actor checks
/// the flag before the next callback.
#[derive(Default)]
struct CallbackGate {
    inner: Mutex<GateState>,
    idle: Condvar,
}

#[derive(Default)]
struct GateState {
    closed: bool,
    running_on: Option<ThreadId>,
}

impl CallbackGate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` unless closed
    ///
    /// A panic in `f` is caught and closes the gate.
    fn run(&self, f: impl FnOnce()) -> Delivery {
        {
            let mut state = self.lock();
            if state.closed {
                return Delivery::Skipped;
            }
            state.running_on = Some(thread::current().id());
        }

        struct Running<'a>(&'a CallbackGate);

        impl Drop for Running<'_> {
            fn drop(&mut self) {
                self.0.lock().running_on = None;
                self.0.idle.notify_all();
            }
        }

        let _running = Running(self);
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(()) => Delivery::Delivered,
            Err(_) => {
                self.lock().closed = true;
                Delivery::Panicked
            }
        }
    }

    fn close(&self) {
        let current = thread::current().id();
        let mut state = self.lock();
        state.closed = true;
        while matches!(state.running_on, Some(id) if id != current) {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Result of handing one callback to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    /// The gate was closed by `close()`
    Skipped,
    Panicked,
}

impl Delivery {
    /// Close reason if the actor must stop
    fn stop_reason(self) -> Option<CloseReason> {
        match self {
            Delivery::Delivered => None,
            Delivery::Skipped => Some(CloseReason::Cancelled),
            Delivery::Panicked => Some(CloseReason::CallbackPanicked),
        }
    }
}

struct Shared {
    cancel: CancellationToken,
    gate: CallbackGate,
    state: watch::Sender<ConnectionState>,
    parser_state: watch::Sender<ParserState>,
}

/// Handle to a reconnecting SSE connection
///
/// Clones share the same connection. The connection is cancelled when the
/// last handle is dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
    _guard: Arc<DropGuard>,
}

impl ConnectionManager {
    /// Start connecting to `url`
    ///
    /// Must be called from within a Tokio runtime; the connection is driven
    /// by a spawned task.
    pub fn open<T: Transport>(
        url: impl Into<String>,
        config: ClientConfig,
        transport: T,
        callbacks: Callbacks,
    ) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(Error::Config("URL cannot be empty".to_string()));
        }
        config.validate()?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Config("ConnectionManager requires a Tokio runtime".to_string()))?;

        let cancel = CancellationToken::new();
        let initial_state = config.initial_state();
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (parser_state, _) = watch::channel(initial_state.clone());

        let shared = Arc::new(Shared {
            cancel: cancel.clone(),
            gate: CallbackGate::default(),
            state,
            parser_state,
        });

        info!(url = %url, transport = transport.name(), "Opening SSE connection");

        let actor = Actor {
            url,
            config,
            transport,
            callbacks,
            shared: Arc::clone(&shared),
            parser_state: initial_state,
        };
        runtime.spawn(actor.run());

        Ok(Self {
            shared,
            _guard: Arc::new(cancel.drop_guard()),
        })
    }

    /// Close the connection and stop reconnecting
    ///
    /// No callback fires after this returns. Safe to call from any thread,
    /// from inside a callback, and more than once.
    pub fn close(&self) {
        if !self.shared.cancel.is_cancelled() {
            info!("SSE connection close requested");
        }
        self.shared.cancel.cancel();
        self.shared.gate.close();
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    /// Subscribe to connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Connection state changes as a stream
    pub fn state_stream(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.subscribe_state())
    }

    /// Last event ID and reconnection interval as carried between attempts
    pub fn parser_state(&self) -> ParserState {
        self.shared.parser_state.borrow().clone()
    }

    /// Wait until the connection is closed for good
    pub async fn wait_closed(&self) -> CloseReason {
        let mut receiver = self.subscribe_state();
        let result = receiver.wait_for(ConnectionState::is_terminal).await;
        match result.as_deref() {
            Ok(ConnectionState::Closed(reason)) => reason.clone(),
            _ => CloseReason::Cancelled,
        }
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

/// How one connection attempt ended
enum Outcome {
    Stopped(CloseReason),
    Ended { error: Option<Error>, opened: bool },
}

struct Actor<T> {
    url: String,
    config: ClientConfig,
    transport: T,
    callbacks: Callbacks,
    shared: Arc<Shared>,
    parser_state: ParserState,
}

impl<T: Transport> Actor<T> {
    async fn run(mut self) {
        let cancel = self.shared.cancel.clone();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return self.finish(CloseReason::Cancelled);
            }

            self.set_state(ConnectionState::Connecting { attempt });
            info!(url = %self.url, attempt, "SSE connecting");

            let (error, opened) = match self.connect_and_stream(&cancel).await {
                Outcome::Stopped(reason) => return self.finish(reason),
                Outcome::Ended { error, opened } => (error, opened),
            };

            if opened {
                attempt = 0;
            }

            match &error {
                Some(err) => warn!(url = %self.url, error = %err, "SSE connection failed"),
                None => info!(url = %self.url, "SSE stream ended"),
            }
            if let Some(reason) = self.emit_error(error.as_ref()).stop_reason() {
                return self.finish(reason);
            }
            if cancel.is_cancelled() {
                return self.finish(CloseReason::Cancelled);
            }

            if !error.as_ref().map_or(true, Error::is_retryable) {
                warn!(url = %self.url, "SSE connection not retryable, closing");
                return self.finish(CloseReason::NonRetryable);
            }

            if let Some(max) = self.config.max_reconnect_attempts {
                if attempt >= max {
                    warn!(url = %self.url, attempts = max, "Max SSE reconnect attempts exceeded");
                    return self.finish(CloseReason::RetriesExhausted);
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = self.parser_state.reconnection_interval;
            self.set_state(ConnectionState::Closed(CloseReason::Reconnecting { delay }));
            warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                last_event_id = ?self.parser_state.last_event_id,
                "SSE reconnecting after delay"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.finish(CloseReason::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect_and_stream(&mut self, cancel: &CancellationToken) -> Outcome {
        let request = self.build_request();
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Outcome::Stopped(CloseReason::Cancelled),
            result = self.connect(&request) => result,
        };

        let response = match connected.and_then(|response| self.check_response(response)) {
            Ok(response) => response,
            Err(err) => {
                return Outcome::Ended {
                    error: Some(err),
                    opened: false,
                }
            }
        };

        self.set_state(ConnectionState::Open);
        info!(url = %self.url, status = response.status, "SSE connection established");
        if let Some(reason) = self.emit_open().stop_reason() {
            return Outcome::Stopped(reason);
        }

        let (mut parser, mut drain) = EventParser::with_state(self.parser_state.clone());
        let mut body = response.body;

        let error = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Outcome::Stopped(CloseReason::Cancelled),
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        parser.feed(&bytes);
                        self.update_parser_state(parser.state());
                        for event in drain.drain_ready() {
                            debug!(event_type = %event.event_type, id = ?event.id, "SSE event received");
                            if let Some(reason) = self.emit_message(event).stop_reason() {
                                return Outcome::Stopped(reason);
                            }
                        }
                    }
                    Some(Err(err)) => break Some(Error::Transport(err)),
                    None => break None,
                },
            }
        };

        Outcome::Ended {
            error,
            opened: true,
        }
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<TransportResponse> {
        match self.config.connect_timeout_duration() {
            Some(limit) => match tokio::time::timeout(limit, self.transport.connect(request)).await {
                Ok(result) => result.map_err(Error::Transport),
                Err(_) => Err(Error::Timeout(limit)),
            },
            None => self.transport.connect(request).await.map_err(Error::Transport),
        }
    }

    fn build_request(&self) -> ConnectRequest {
        let mut headers: BTreeMap<String, String> = self
            .config
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(LAST_EVENT_ID_HEADER))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        headers
            .entry("Accept".to_string())
            .or_insert_with(|| EVENT_STREAM_CONTENT_TYPE.to_string());
        headers
            .entry("Cache-Control".to_string())
            .or_insert_with(|| "no-cache".to_string());

        if let Some(id) = &self.parser_state.last_event_id {
            headers.insert(LAST_EVENT_ID_HEADER.to_string(), id.clone());
        }

        ConnectRequest {
            url: self.url.clone(),
            headers,
        }
    }

    fn check_response(&self, response: TransportResponse) -> Result<TransportResponse> {
        let status = response.status;
        if self.config.is_non_retry_status(status) {
            return Err(Error::NoContent(status));
        }
        if !(200..300).contains(&status) {
            return Err(Error::InvalidStatus(status));
        }
        if !response.is_event_stream() {
            return Err(Error::InvalidContentType(
                response.content_type.unwrap_or_default(),
            ));
        }
        Ok(response)
    }

    fn update_parser_state(&mut self, state: &ParserState) {
        if &self.parser_state != state {
            self.parser_state = state.clone();
            self.shared.parser_state.send_replace(state.clone());
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.shared.state.send_replace(state);
    }

    fn finish(&self, reason: CloseReason) {
        match reason {
            CloseReason::Cancelled => self.set_state(ConnectionState::Closing),
            CloseReason::CallbackPanicked => {
                error!(url = %self.url, "SSE callback panicked, closing connection")
            }
            _ => {}
        }
        info!(url = %self.url, reason = ?reason, "SSE connection closed");
        self.set_state(ConnectionState::Closed(reason));
    }

    fn emit_open(&self) -> Delivery {
        let callback = self.callbacks.on_open.as_deref();
        self.shared.gate.run(|| {
            if let Some(on_open) = callback {
                on_open();
            }
        })
    }

    fn emit_message(&self, event: Event) -> Delivery {
        let callback = self.callbacks.on_message.as_deref();
        self.shared.gate.run(|| {
            if let Some(on_message) = callback {
                on_message(event);
            }
        })
    }

    fn emit_error(&self, error: Option<&Error>) -> Delivery {
        let callback = self.callbacks.on_error.as_deref();
        self.shared.gate.run(|| {
            if let Some(on_error) = callback {
                on_error(error);
            }
        })
    }
}
