//! Agent dispatch loop

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::connector::{ConnectorError, StorageConnector};
use crate::error::{AppError, RuntimeError};
use crate::protocol::Envelope;
use crate::registry::ResultRegistry;
use crate::uploader::{TickReport, UploadError, UploadScheduler};

use super::{Connectable, Inbox, MessageHandler, Tickable};

/// Lifecycle of [`Agent::run`], published on a watch channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    Starting,
    Running,
    Stopped,
    /// Connecting failed; the message is the connector error
    Failed(String),
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Starting => "starting",
            AgentStatus::Running => "running",
            AgentStatus::Stopped => "stopped",
            AgentStatus::Failed(_) => "failed",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AgentStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the run loop has exited
    pub fn is_finished(&self) -> bool {
        matches!(self, AgentStatus::Stopped | AgentStatus::Failed(_))
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Failed(e) => write!(f, "failed: {}", e),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Owns the three components and routes envelopes between them
pub struct Agent {
    scheduler: UploadScheduler,
    connector: StorageConnector,
    registry: ResultRegistry,
    inbox: Inbox,
    tick_interval: Duration,
    status: watch::Sender<AgentStatus>,
}

impl Agent {
    pub fn new(
        scheduler: UploadScheduler,
        connector: StorageConnector,
        registry: ResultRegistry,
        inbox: Inbox,
        tick_interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            connector,
            registry,
            inbox,
            tick_interval,
            status: watch::channel(AgentStatus::Starting).0,
        }
    }

    /// Subscribe to lifecycle changes of [`Agent::run`]
    pub fn status(&self) -> watch::Receiver<AgentStatus> {
        self.status.subscribe()
    }

    pub fn scheduler(&self) -> &UploadScheduler {
        &self.scheduler
    }

    pub fn connector(&self) -> &StorageConnector {
        &self.connector
    }

    pub fn registry(&self) -> &ResultRegistry {
        &self.registry
    }

    pub async fn connect(&mut self) -> Result<(), ConnectorError> {
        self.connector.connect().await
    }

    /// Run one scan of the upload source
    pub async fn tick(&mut self) -> Result<TickReport, UploadError> {
        self.scheduler.tick().await
    }

    /// Deliver one envelope to the component it is addressed to
    pub async fn dispatch(&self, envelope: Envelope) -> Result<(), AppError> {
        if envelope.to == self.connector.connection_id() {
            self.connector.handle(envelope).await?;
        } else if envelope.to == self.scheduler.agent_id() {
            // Registry errors are uninhabited
            let _ = self.registry.handle(envelope).await;
        } else {
            return Err(RuntimeError::UnknownRecipient(envelope.to).into());
        }
        Ok(())
    }

    /// Deliver queued envelopes until the bus is empty and no upload job is
    /// still running. Returns the number of envelopes delivered.
    pub async fn settle(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            while let Some(envelope) = self.inbox.try_recv() {
                self.dispatch_logged(envelope).await;
                delivered += 1;
            }
            self.connector.wait_idle().await;

            // Jobs that finished during the wait may have queued replies
            match self.inbox.try_recv() {
                Some(envelope) => {
                    self.dispatch_logged(envelope).await;
                    delivered += 1;
                }
                None => return delivered,
            }
        }
    }

    /// Connect, then tick and dispatch until `shutdown` resolves or the bus
    /// closes. Pending upload jobs finish before the connector disconnects.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        if let Err(e) = self.connector.connect().await {
            tracing::error!(
                connection_id = %self.connector.connection_id(),
                "Agent failed to connect: {}",
                e
            );
            self.status.send_replace(AgentStatus::Failed(e.to_string()));
            return Err(e.into());
        }
        self.status.send_replace(AgentStatus::Running);

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(
            agent_id = %self.scheduler.agent_id(),
            connection_id = %self.connector.connection_id(),
            interval_secs = self.tick_interval.as_secs(),
            "Agent started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Agent shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!("Upload tick failed: {}", e);
                    }
                }
                received = self.inbox.recv() => match received {
                    Some(envelope) => self.dispatch_logged(envelope).await,
                    None => {
                        tracing::warn!("Message bus closed");
                        break;
                    }
                },
            }
        }

        self.connector.wait_idle().await;
        self.connector.disconnect().await;
        self.status.send_replace(AgentStatus::Stopped);
        Ok(())
    }

    async fn dispatch_logged(&self, envelope: Envelope) {
        let to = envelope.to.clone();
        if let Err(e) = self.dispatch(envelope).await {
            tracing::error!(to = %to, "Dispatch failed: {}", e);
        }
    }
}
