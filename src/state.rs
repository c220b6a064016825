//! Application state management

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::registry::ResultRegistry;
use crate::runtime::{AgentStatus, Outbox};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    registry: ResultRegistry,
    outbox: Outbox,
    agent_status: watch::Receiver<AgentStatus>,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: ResultRegistry,
        outbox: Outbox,
        agent_status: watch::Receiver<AgentStatus>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                registry,
                outbox,
                agent_status,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Read handle onto the downloads the agent has collected
    pub fn registry(&self) -> &ResultRegistry {
        &self.inner.registry
    }

    /// Sending half of the agent's message bus
    pub fn outbox(&self) -> &Outbox {
        &self.inner.outbox
    }

    /// Latest lifecycle state published by the agent
    pub fn agent_status(&self) -> AgentStatus {
        self.inner.agent_status.borrow().clone()
    }
}
