//! Offline Worker - offline-first caching proxy for a single-page app
//!
//! Installs and activates the worker against the configured origin, then
//! serves every request through it.

use offline_worker::{
    start_server, HttpNetwork, LocalHost, Result, ServiceWorker, SharedState, WorkerConfig,
    WorkerError,
};
use partition_cache::{FileStore, MemoryStore, PartitionStore};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("offline_worker=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Offline Worker...");

    let config = WorkerConfig::from_env()?;
    info!("Port: {}", config.port);
    info!("Origin: {}", config.origin);
    info!("Scope: {}", config.base_path);
    info!(
        "Partitions: {} / {}",
        config.static_partition(),
        config.dynamic_partition()
    );

    let store: Arc<dyn PartitionStore> = match &config.cache_dir {
        Some(dir) => {
            info!("Cache dir: {:?}", dir);
            let store = FileStore::new(dir.clone());
            store.init().await?;
            Arc::new(store)
        }
        None => {
            info!("Cache dir: none, caching in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let network = Arc::new(HttpNetwork::new(&config)?);
    let host = Arc::new(LocalHost::new());

    let mut client_messages = host.subscribe();
    tokio::spawn(async move {
        while let Ok(message) = client_messages.recv().await {
            info!(?message, "Message to clients");
        }
    });

    let port = config.port;
    let worker = ServiceWorker::new(config, store, network, host);

    // A failed install leaves the worker redundant; requests still pass through
    if let Err(e) = worker.start().await {
        error!(error = %e, "Worker did not activate, serving without cache");
    }

    let state: SharedState = Arc::new(worker);

    // Start HTTP server (blocking)
    start_server(state, port)
        .await
        .map_err(|e| WorkerError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
