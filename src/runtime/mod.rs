//! Host runtime
//!
//! Small capabilities the components implement, plus the in-process message
//! bus and dispatch loop that drive them.

mod agent;
mod outbox;

pub use agent::{Agent, AgentStatus};
pub use outbox::{channel, Inbox, Outbox};

use crate::protocol::Envelope;

/// Component holding an external connection
#[async_trait::async_trait]
pub trait Connectable: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn connect(&mut self) -> Result<(), Self::Error>;

    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

/// Component driven by a fixed-period tick
#[async_trait::async_trait]
pub trait Tickable: Send {
    type Report: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn tick(&mut self) -> Result<Self::Report, Self::Error>;
}

/// Component receiving delivered envelopes
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn handle(&self, envelope: Envelope) -> Result<(), Self::Error>;
}
