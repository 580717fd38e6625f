use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enrichment::providers::FsObjectStore;
use worker_core::{wiring, BatchWorker, Config, JetStreamQueue};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,worker_core=debug,enrichment=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting document enrichment worker");

    let config = Config::from_env().context("Failed to load configuration")?;

    let client = async_nats::connect(config.nats_url.as_str())
        .await
        .context("Failed to connect to NATS")?;
    let queue = JetStreamQueue::connect(client, &config.jetstream_settings()).await?;

    let store = Arc::new(FsObjectStore::new(&config.object_store_root));
    let processor = wiring::build_processor(&config, store);

    let worker = BatchWorker::new(Arc::new(queue), Arc::new(processor))
        .with_config(config.worker_config());

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        signal.cancel();
    });

    worker.run(shutdown).await
}
