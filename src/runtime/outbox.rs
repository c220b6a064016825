//! In-process message bus
//!
//! Unbounded so that a component sending from inside the dispatch loop can
//! never wait on the loop itself.

use tokio::sync::mpsc;

use crate::error::RuntimeError;
use crate::protocol::Envelope;

/// Sending half, cloned into every component that emits messages
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Outbox {
    /// Hand an envelope to the bus. Fire-and-forget: success means queued,
    /// not delivered.
    pub fn send(&self, envelope: Envelope) -> Result<(), RuntimeError> {
        tracing::debug!(
            to = %envelope.to,
            sender = %envelope.sender,
            performative = %envelope.performative(),
            "Envelope queued"
        );
        self.tx
            .send(envelope)
            .map_err(|_| RuntimeError::ChannelClosed)
    }
}

/// Receiving half, owned by the dispatch loop
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Inbox {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Next queued envelope, if any, without waiting
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

pub fn channel() -> (Outbox, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Outbox { tx }, Inbox { rx })
}
