//! The byte → event pipeline
//!
//! [`EventParser`] chains the [`LineBuffer`], [`classify`] and the
//! [`EventAssembler`], pushing finished events into an [`EventQueue`].
//! [`EventStream`] drives the same pipeline from any stream of byte chunks.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::{Stream, StreamExt};
use tracing::trace;

use crate::assembler::{EventAssembler, ParserState};
use crate::event::Event;
use crate::field::{classify, FieldEvent};
use crate::line::LineBuffer;
use crate::queue::{event_queue, Drained, EventDrain, EventQueue};

/// Synchronous, incremental SSE parser
///
/// Never blocks and never fails; feed it bytes in chunks of any size and read
/// the events from the paired [`EventDrain`].
#[derive(Debug)]
pub struct EventParser {
    lines: LineBuffer,
    assembler: EventAssembler,
    queue: EventQueue,
}

impl EventParser {
    /// Create a parser with default state and its event drain
    pub fn new() -> (Self, EventDrain) {
        Self::with_state(ParserState::default())
    }

    /// Create a parser resuming from `state`
    pub fn with_state(state: ParserState) -> (Self, EventDrain) {
        let (queue, drain) = event_queue();
        let parser = Self {
            lines: LineBuffer::new(),
            assembler: EventAssembler::with_state(state),
            queue,
        };
        (parser, drain)
    }

    /// Consume a chunk of bytes; returns the number of events queued
    ///
    /// After [`finish`](Self::finish), or once the drain is dropped, events
    /// are no longer queued and this returns 0. Fields still update
    /// [`state`](Self::state).
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let mut queued = 0;
        for line in self.lines.feed(bytes) {
            if let Some(event) = apply_line(&mut self.assembler, &line) {
                if self.queue.enqueue(event) {
                    queued += 1;
                }
            }
        }
        queued
    }

    /// Signal end of input
    ///
    /// Remaining unterminated content is processed as a final line; an event
    /// still missing its blank line is discarded. The drain reports
    /// [`Drained::Finished`] once it is empty.
    pub fn finish(&mut self) {
        for line in self.lines.flush() {
            if let Some(event) = apply_line(&mut self.assembler, &line) {
                self.queue.enqueue(event);
            }
        }
        self.assembler.reset_pending();
        self.queue.finish();
    }

    /// Whether [`finish`](Self::finish) has been called
    pub fn is_finished(&self) -> bool {
        self.queue.is_finished()
    }

    /// Persistent state (last event ID, reconnection interval)
    pub fn state(&self) -> &ParserState {
        self.assembler.state()
    }
}

fn apply_line(assembler: &mut EventAssembler, line: &[u8]) -> Option<Event> {
    let field = classify(line);
    match &field {
        FieldEvent::Comment(text) => trace!(comment = %text, "SSE comment"),
        FieldEvent::Unknown { name } => trace!(field = %name, "Ignoring unknown SSE field"),
        _ => {}
    }
    assembler.apply(field)
}

/// A [`Stream`] of [`Event`]s parsed from a stream of byte chunks
///
/// Transport errors from the inner stream are passed through unchanged and do
/// not end the event stream.
#[derive(Debug)]
pub struct EventStream<S> {
    inner: S,
    parser: EventParser,
    drain: EventDrain,
}

impl<S> EventStream<S> {
    /// Wrap a byte stream
    pub fn new(inner: S) -> Self {
        Self::with_state(inner, ParserState::default())
    }

    /// Wrap a byte stream, resuming from `state`
    pub fn with_state(inner: S, state: ParserState) -> Self {
        let (parser, drain) = EventParser::with_state(state);
        Self {
            inner,
            parser,
            drain,
        }
    }

    /// Persistent parser state as of the last consumed chunk
    pub fn state(&self) -> &ParserState {
        self.parser.state()
    }

    /// Last event ID seen so far
    pub fn last_event_id(&self) -> Option<&str> {
        self.parser.state().last_event_id.as_deref()
    }
}

impl<S, B, E> Stream for EventStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<Event, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.drain.try_drain_next() {
                Drained::Event(event) => return Poll::Ready(Some(Ok(event))),
                Drained::Finished => return Poll::Ready(None),
                Drained::Empty => {}
            }

            match ready!(this.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    this.parser.feed(chunk.as_ref());
                }
                Some(Err(err)) => return Poll::Ready(Some(Err(err))),
                None => this.parser.finish(),
            }
        }
    }
}
