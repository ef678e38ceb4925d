//! FIFO of dispatched events with an explicit finish signal

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::event::Event;

/// Result of a non-blocking drain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drained {
    /// The oldest queued event
    Event(Event),
    /// Nothing queued yet, more may follow
    Empty,
    /// The queue is finished and fully drained
    Finished,
}

/// Producer side of the event queue
#[derive(Debug)]
pub struct EventQueue {
    sender: Option<mpsc::UnboundedSender<Event>>,
}

/// Consumer side of the event queue
#[derive(Debug)]
pub struct EventDrain {
    receiver: mpsc::UnboundedReceiver<Event>,
}

/// Create a connected producer/consumer pair
pub fn event_queue() -> (EventQueue, EventDrain) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        EventQueue {
            sender: Some(sender),
        },
        EventDrain { receiver },
    )
}

impl EventQueue {
    /// Append an event
    ///
    /// Returns `false` if the queue is finished or the consumer is gone.
    pub fn enqueue(&self, event: Event) -> bool {
        match &self.sender {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Mark the end of the stream; already queued events remain drainable
    pub fn finish(&mut self) {
        self.sender = None;
    }

    /// Whether [`finish`](Self::finish) has been called
    pub fn is_finished(&self) -> bool {
        self.sender.is_none()
    }
}

impl EventDrain {
    /// Take the next event without waiting
    pub fn try_drain_next(&mut self) -> Drained {
        match self.receiver.try_recv() {
            Ok(event) => Drained::Event(event),
            Err(mpsc::error::TryRecvError::Empty) => Drained::Empty,
            Err(mpsc::error::TryRecvError::Disconnected) => Drained::Finished,
        }
    }

    /// Wait for the next event; `None` once the queue is finished and empty
    pub async fn drain_next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Drain every event queued so far
    pub fn drain_ready(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Drained::Event(event) = self.try_drain_next() {
            events.push(event);
        }
        events
    }
}

impl Stream for EventDrain {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
