//! Event relay
//!
//! Delivers lifecycle events to the consuming application. All commands go
//! through one unbounded channel into a single delivery loop, so emission
//! never blocks the state machine and every event, attach, detach and flush
//! is handled in the order it was issued.
//!
//! With no listener attached, retryable events are buffered in emission order
//! (bounded, oldest dropped first) and everything else is discarded. A
//! listener whose receiving end has gone away counts as detached.

mod delivery;

use crate::domain::session::event::{CallEvent, EventEnvelope, PendingEvent};
use delivery::DeliveryLoop;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Sending half handed to the relay as a listener
pub type Listener = mpsc::UnboundedSender<EventEnvelope>;

/// Receiving half the application reads events from
pub type EventStream = mpsc::UnboundedReceiver<EventEnvelope>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStatus {
    pub listener_attached: bool,
    pub buffered: usize,
}

pub(crate) enum Command {
    Emit(EventEnvelope),
    Attach(Listener),
    Detach,
    Flush(oneshot::Sender<usize>),
    Drain(oneshot::Sender<Vec<EventEnvelope>>),
    Clear,
    Status(oneshot::Sender<RelayStatus>),
}

#[derive(Clone)]
pub struct EventRelay {
    tx: mpsc::UnboundedSender<Command>,
}

impl EventRelay {
    /// Start the delivery loop on the current tokio runtime
    pub fn spawn(buffer_capacity: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(DeliveryLoop::new(buffer_capacity).run(rx));
        Self { tx }
    }

    /// Post an event. Never blocks.
    pub fn emit(&self, event: CallEvent) {
        crate::infrastructure::metrics::record_event_emitted(event.name());
        self.send(Command::Emit(EventEnvelope::new(event)));
    }

    pub fn emit_all(&self, events: impl IntoIterator<Item = CallEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Attach a listener. Buffered events stay buffered until [`flush`].
    ///
    /// [`flush`]: EventRelay::flush
    pub fn attach_listener(&self, listener: Listener) {
        self.send(Command::Attach(listener));
    }

    /// Attach a fresh channel and replay the buffer into it
    pub async fn subscribe(&self) -> EventStream {
        let (listener, stream) = mpsc::unbounded_channel();
        self.attach_listener(listener);
        self.flush().await;
        stream
    }

    /// Revert to buffering mode
    pub fn detach_listener(&self) {
        self.send(Command::Detach);
    }

    /// Deliver buffered events to the attached listener in emission order.
    /// Returns how many were delivered.
    pub async fn flush(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Flush(reply));
        rx.await.unwrap_or(0)
    }

    /// Take the buffered events without a listener, clearing the buffer
    pub async fn drain(&self) -> Vec<PendingEvent> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Drain(reply));
        rx.await
            .unwrap_or_default()
            .iter()
            .map(|envelope| PendingEvent::from(&envelope.event))
            .collect()
    }

    pub fn clear(&self) {
        self.send(Command::Clear);
    }

    /// Current state, observed after every previously issued command
    pub async fn status(&self) -> RelayStatus {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status(reply));
        rx.await.unwrap_or(RelayStatus {
            listener_attached: false,
            buffered: 0,
        })
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("Event relay delivery loop has stopped");
        }
    }
}
