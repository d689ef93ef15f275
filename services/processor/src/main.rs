use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use processor::config::Config;
use processor::http::{self, AppState};
use processor::ingestion::{Ingestor, RedisStreamSource};
use processor::repository::{PostgresTransactionRepository, TransactionRepository};
use processor::worker_pool::WorkerPool;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging with JSON formatting (configurable via env)
    let use_json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .eq_ignore_ascii_case("json");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "processor=info".into());

    if use_json {
        // JSON structured logging for production
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        // Human-readable logging for development
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        service = "processor",
        version = env!("CARGO_PKG_VERSION"),
        log_format = if use_json { "json" } else { "text" },
        "Starting processor service"
    );

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        worker_count = config.pool.worker_count,
        queue_capacity = config.pool.queue_capacity,
        item_timeout_ms = config.pool.item_timeout_ms,
        "Configuration loaded"
    );

    let postgres = Arc::new(
        PostgresTransactionRepository::connect(&config.database.url, config.database.pool_size)
            .await
            .context("failed to initialise transaction store")?,
    );
    tracing::info!(pool_size = config.database.pool_size, "Database connected");
    let repository: Arc<dyn TransactionRepository> = postgres.clone();

    // Metrics recorder and HTTP surface
    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    let http_handle = tokio::spawn(http::serve(
        config.metrics_port,
        AppState::new(repository.clone(), Some(prometheus)),
    ));

    // Initialize and start the worker pool
    let pool = Arc::new(WorkerPool::new(config.pool.clone(), repository)?);
    pool.start().await?;

    let source = RedisStreamSource::connect(&config.redis).await?;
    let ingest_cancel = CancellationToken::new();
    let ingest_handle = tokio::spawn(Ingestor::new(source, pool.clone()).run(ingest_cancel.clone()));

    tracing::info!("Processor running");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    // Stop reading before closing the pool so no submit races the shutdown
    ingest_cancel.cancel();
    match ingest_handle.await {
        Ok(Ok(stats)) => tracing::info!(
            submitted = stats.submitted,
            malformed = stats.malformed,
            "Ingestion stopped"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "Ingestion failed"),
        Err(e) => tracing::error!(error = %e, "Ingestion task panicked"),
    }

    pool.shutdown().await;
    http_handle.abort();
    postgres.close().await;

    tracing::info!("Processor stopped");

    Ok(())
}
