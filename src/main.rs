//! File Storage Agent
//!
//! Runs the upload scheduler, storage connector and result registry in one
//! process, with a small HTTP surface for inspecting results.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_storage_agent::config::{Config, StorageProvider};
use file_storage_agent::connector::{BlobStoreFactory, MemoryBlobStore, S3Factory, StorageConnector};
use file_storage_agent::registry::ResultRegistry;
use file_storage_agent::routes;
use file_storage_agent::runtime::{self, Agent, AgentStatus};
use file_storage_agent::state::AppState;
use file_storage_agent::uploader::{LocalFileSource, UploadScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_storage_agent=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting File Storage Agent v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Storage provider: {:?}", config.storage.provider);
    tracing::info!("S3 endpoint: {}", config.storage.endpoint);
    tracing::info!("S3 bucket: {}", config.storage.bucket);
    tracing::info!("Upload source: {}", config.uploader.source);

    let factory: Arc<dyn BlobStoreFactory> = match config.storage.provider {
        StorageProvider::Memory => Arc::new(MemoryBlobStore::new()),
        _ => Arc::new(S3Factory),
    };

    let source = LocalFileSource::new(&config.uploader.source)
        .with_context(|| format!("Invalid upload source {}", config.uploader.source))?;

    // Wire the components onto one bus
    let (outbox, inbox) = runtime::channel();
    let registry = ResultRegistry::new();
    let scheduler = UploadScheduler::new(
        &config.uploader,
        config.connector.connection_id.clone(),
        Box::new(source),
        outbox.clone(),
    );
    let connector = StorageConnector::new(
        config.connector.clone(),
        config.storage.clone(),
        factory,
        outbox.clone(),
    );
    let agent = Agent::new(
        scheduler,
        connector,
        registry.clone(),
        inbox,
        Duration::from_secs(config.uploader.tick_interval_secs.max(1)),
    );

    let agent_status = agent.status();
    let app_state = AppState::new(config.clone(), registry, outbox, agent.status());

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let agent_task = tokio::spawn(agent.run(async move {
        let _ = stop_rx.changed().await;
    }));

    let app = routes::app(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("File Storage Agent listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = agent_stopped(agent_status) => {}
            }
        })
        .await
        .context("Server error")?;

    let _ = stop_tx.send(true);
    if let Err(e) = agent_task.await.context("Agent task panicked")? {
        tracing::error!("Agent exited with error: {}", e);
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves once the agent loop has exited on its own
async fn agent_stopped(mut status: watch::Receiver<AgentStatus>) {
    match status.wait_for(AgentStatus::is_finished).await {
        Ok(state) => tracing::error!("Agent {}, stopping server", *state),
        Err(_) => tracing::error!("Agent task ended, stopping server"),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
