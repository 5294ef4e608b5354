//! The relay's delivery loop

use super::{Command, Listener, RelayStatus};
use crate::domain::session::event::EventEnvelope;
use crate::domain::shared::events::DomainEvent;
use crate::infrastructure::metrics;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub(super) struct DeliveryLoop {
    listener: Option<Listener>,
    buffer: VecDeque<EventEnvelope>,
    capacity: usize,
}

impl DeliveryLoop {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            listener: None,
            buffer: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub(super) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Emit(envelope) => self.deliver(envelope),
                Command::Attach(listener) => {
                    info!("Event listener attached ({} buffered)", self.buffer.len());
                    self.listener = Some(listener);
                }
                Command::Detach => {
                    if self.listener.take().is_some() {
                        info!("Event listener detached");
                    }
                }
                Command::Flush(reply) => {
                    let delivered = self.flush();
                    let _ = reply.send(delivered);
                }
                Command::Drain(reply) => {
                    let drained: Vec<_> = self.buffer.drain(..).collect();
                    debug!("Drained {} buffered events", drained.len());
                    let _ = reply.send(drained);
                }
                Command::Clear => {
                    debug!("Cleared {} buffered events", self.buffer.len());
                    self.buffer.clear();
                }
                Command::Status(reply) => {
                    let _ = reply.send(RelayStatus {
                        listener_attached: self.listener.is_some(),
                        buffered: self.buffer.len(),
                    });
                }
            }
        }

        debug!("Event relay delivery loop finished");
    }

    fn deliver(&mut self, envelope: EventEnvelope) {
        // A backlog waiting for flush keeps its place ahead of newer events;
        // pings that cannot wait behind it are dropped.
        if !self.buffer.is_empty() {
            self.buffer_or_drop(envelope);
            return;
        }

        if let Err(envelope) = self.send_to_listener(envelope) {
            self.buffer_or_drop(envelope);
        }
    }

    /// Hand one event to the listener, detaching it if its receiver is gone
    fn send_to_listener(&mut self, envelope: EventEnvelope) -> Result<(), EventEnvelope> {
        let Some(listener) = self.listener.as_ref() else {
            return Err(envelope);
        };

        debug!(
            "Delivering {} event {} ({})",
            envelope.event_type(),
            envelope.event_id(),
            envelope.occurred_at()
        );
        match listener.send(envelope) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(envelope)) => {
                warn!("Event listener went away, reverting to buffering");
                self.listener = None;
                Err(envelope)
            }
        }
    }

    fn buffer_or_drop(&mut self, envelope: EventEnvelope) {
        if !envelope.event.retry_if_undelivered() {
            debug!(
                "Dropping undeliverable {} event {}",
                envelope.event_type(),
                envelope.event_id()
            );
            metrics::record_event_dropped("not_retryable");
            return;
        }

        if self.buffer.len() >= self.capacity {
            if let Some(oldest) = self.buffer.pop_front() {
                warn!(
                    "Event buffer full ({}), dropping oldest {} event",
                    self.capacity,
                    oldest.event.name()
                );
                metrics::record_event_dropped("buffer_full");
            }
        }

        debug!("Buffering {} event", envelope.event.name());
        metrics::record_event_buffered();
        self.buffer.push_back(envelope);
    }

    fn flush(&mut self) -> usize {
        let mut delivered = 0;

        while let Some(envelope) = self.buffer.pop_front() {
            match self.send_to_listener(envelope) {
                Ok(()) => delivered += 1,
                Err(envelope) => {
                    self.buffer.push_front(envelope);
                    break;
                }
            }
        }

        if delivered > 0 {
            info!("Flushed {} buffered events", delivered);
        }
        delivered
    }
}
