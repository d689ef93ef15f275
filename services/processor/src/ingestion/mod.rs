//! Queue ingestion
//!
//! Pulls raw deliveries from a [`MessageSource`], parses them and hands the
//! transactions to the worker pool. Malformed payloads never reach the pool.

mod redis_stream;

use async_trait::async_trait;
use shared::errors::ErrorCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::parse_transaction;
use crate::errors::PoolError;
use crate::worker_pool::WorkerPool;

pub use redis_stream::RedisStreamSource;

/// Pause before reading again after the source failed
const SOURCE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A single message as delivered by the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn new(id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }
}

#[async_trait]
pub trait MessageSource: Send {
    /// Next batch of deliveries, possibly empty. `None` once the source is exhausted.
    async fn next_batch(&mut self) -> anyhow::Result<Option<Vec<Delivery>>>;

    /// Acknowledge deliveries so they are not redelivered
    async fn ack(&mut self, ids: &[String]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub submitted: u64,
    pub malformed: u64,
}

pub struct Ingestor<S> {
    source: S,
    pool: Arc<WorkerPool>,
}

impl<S: MessageSource> Ingestor<S> {
    pub fn new(source: S, pool: Arc<WorkerPool>) -> Self {
        Self { source, pool }
    }

    /// Consume until `cancel` fires or the source is exhausted.
    ///
    /// Fails only when the pool refuses a transaction, which means it has
    /// been shut down underneath the ingestor.
    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<IngestStats> {
        tracing::info!("Ingestor started");
        let mut stats = IngestStats::default();

        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                batch = self.source.next_batch() => batch,
            };

            let deliveries = match batch {
                Ok(Some(deliveries)) => deliveries,
                Ok(None) => {
                    tracing::info!("Message source exhausted");
                    break;
                }
                Err(e) => {
                    tracing::error!(
                        error_code = %ErrorCode::NETWORK_REDIS_CONNECTION,
                        error = %e,
                        "Failed to read from message source"
                    );
                    metrics::counter!("ingest_source_errors_total").increment(1);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(SOURCE_RETRY_DELAY) => continue,
                    }
                }
            };

            if deliveries.is_empty() {
                continue;
            }

            let mut handled = Vec::with_capacity(deliveries.len());
            let mut refused = None;

            for delivery in deliveries {
                let tx = match parse_transaction(&delivery.payload) {
                    Ok(tx) => tx,
                    Err(e) => {
                        tracing::warn!(
                            message_id = %delivery.id,
                            error_code = %ErrorCode::VALIDATION_MALFORMED_PAYLOAD,
                            error = %e,
                            "Discarding malformed message"
                        );
                        metrics::counter!("ingest_malformed_total").increment(1);
                        stats.malformed += 1;
                        handled.push(delivery.id);
                        continue;
                    }
                };

                match self.pool.submit(tx).await {
                    Ok(()) => {
                        stats.submitted += 1;
                        handled.push(delivery.id);
                    }
                    Err(e) => {
                        refused = Some(e);
                        break;
                    }
                }
            }

            self.acknowledge(&handled).await;

            if let Some(e) = refused {
                return Err(refusal(e));
            }
        }

        tracing::info!(
            submitted = stats.submitted,
            malformed = stats.malformed,
            "Ingestor stopped"
        );
        Ok(stats)
    }

    async fn acknowledge(&mut self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.source.ack(ids).await {
            // Unacked messages stay pending and are replayed by the source
            tracing::error!(count = ids.len(), error = %e, "Failed to acknowledge messages");
        }
    }
}

fn refusal(error: PoolError) -> anyhow::Error {
    tracing::warn!(error = %error, "Worker pool refused transaction, stopping ingestion");
    anyhow::Error::new(error).context("worker pool stopped accepting transactions")
}
