//! Individual worker implementation
//!
//! Pulls transactions from the shared input queue, simulates processing under
//! a per-item deadline and forwards every outcome to the listeners.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::{InFlightPolicy, PoolConfig};
use crate::domain::{ErrorRecord, Transaction, TransactionStatus};
use crate::errors::ProcessingError;

use super::simulation::{self, RandomSource};

/// Input queue receiver shared by every worker in the pool
pub(crate) type SharedReceiver = Arc<Mutex<mpsc::Receiver<Transaction>>>;

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub simulated_latency: Duration,
    pub item_timeout: Duration,
    pub in_flight_policy: InFlightPolicy,
}

impl From<&PoolConfig> for WorkerSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            simulated_latency: config.simulated_latency(),
            item_timeout: config.item_timeout(),
            in_flight_policy: config.in_flight_policy,
        }
    }
}

/// Individual worker for processing transactions
pub struct Worker {
    pub id: usize,
    input: SharedReceiver,
    results: mpsc::Sender<Transaction>,
    errors: mpsc::Sender<ErrorRecord>,
    cancel: CancellationToken,
    settings: WorkerSettings,
    random: Box<dyn RandomSource>,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        input: SharedReceiver,
        results: mpsc::Sender<Transaction>,
        errors: mpsc::Sender<ErrorRecord>,
        cancel: CancellationToken,
        settings: WorkerSettings,
        random: Box<dyn RandomSource>,
    ) -> Self {
        Self {
            id,
            input,
            results,
            errors,
            cancel,
            settings,
            random,
        }
    }

    /// Run the worker's main processing loop
    pub async fn run(mut self) {
        tracing::debug!(worker_id = self.id, "Worker started");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!(worker_id = self.id, "Worker shutting down due to global cancellation");
                    break;
                }
                next = next_transaction(&self.input) => next,
            };

            let Some(tx) = next else {
                tracing::warn!(worker_id = self.id, "Worker shutting down due to input queue closure");
                break;
            };

            self.handle(tx).await;
        }

        tracing::debug!(worker_id = self.id, "Worker stopped");
    }

    async fn handle(&mut self, mut tx: Transaction) {
        let start_time = Instant::now();
        let transaction_id = tx.id.clone();

        let result = self.process(&mut tx).await;
        let status = tx.status();

        metrics::counter!("transactions_processed_total", "status" => status.as_str()).increment(1);
        metrics::histogram!("transaction_processing_duration_seconds")
            .record(start_time.elapsed().as_secs_f64());

        if let Err(error) = result {
            let record = ErrorRecord::new(tx.clone(), error);
            if forward(&self.errors, record).await.is_err() {
                tracing::error!(
                    worker_id = self.id,
                    transaction_id = %transaction_id,
                    "Error queue unavailable, error record dropped"
                );
                metrics::counter!("transactions_dropped_total", "queue" => "error").increment(1);
            }
        }

        match forward(&self.results, tx).await {
            Ok(()) => tracing::debug!(
                worker_id = self.id,
                transaction_id = %transaction_id,
                status = %status,
                "Worker processed transaction"
            ),
            Err(_) => {
                tracing::error!(
                    worker_id = self.id,
                    transaction_id = %transaction_id,
                    status = %status,
                    "Result queue unavailable, transaction outcome dropped"
                );
                metrics::counter!("transactions_dropped_total", "queue" => "result").increment(1);
            }
        }
    }

    /// Settle `tx` and return the hard error, if any.
    async fn process(&mut self, tx: &mut Transaction) -> Result<(), ProcessingError> {
        let latency = simulate_latency(&self.settings, &self.cancel);
        let waited = timeout(self.settings.item_timeout, latency).await;

        let outcome = match waited {
            Ok(true) => simulation::decide(self.random.next_draw()),
            Ok(false) => {
                tracing::info!(worker_id = self.id, transaction_id = %tx.id, "Transaction processing cancelled");
                settle(tx, TransactionStatus::Failed);
                return Err(ProcessingError::Cancelled { id: tx.id.clone() });
            }
            Err(_) => {
                settle(tx, TransactionStatus::Failed);
                return Err(ProcessingError::DeadlineExceeded {
                    id: tx.id.clone(),
                    timeout: self.settings.item_timeout,
                });
            }
        };

        settle(tx, outcome.status());
        if outcome.is_hard_error() {
            return Err(ProcessingError::Simulated { id: tx.id.clone() });
        }
        Ok(())
    }
}

/// Returns `false` when the delay was cut short by shutdown
async fn simulate_latency(settings: &WorkerSettings, cancel: &CancellationToken) -> bool {
    let delay = sleep(settings.simulated_latency);
    match settings.in_flight_policy {
        InFlightPolicy::Finish => {
            delay.await;
            true
        }
        InFlightPolicy::Abort => tokio::select! {
            _ = delay => true,
            _ = cancel.cancelled() => false,
        },
    }
}

async fn next_transaction(input: &SharedReceiver) -> Option<Transaction> {
    input.lock().await.recv().await
}

fn settle(tx: &mut Transaction, status: TransactionStatus) {
    if !tx.settle(status) {
        tracing::warn!(transaction_id = %tx.id, current = %tx.status(), "Transaction already settled");
    }
}

/// Write `item` to a bounded output queue, waiting for capacity.
///
/// Cancellation is not watched here: the listeners keep draining until every
/// worker has exited, so the wait always ends. The item is handed back only
/// if the queue is closed.
pub(crate) async fn forward<T>(queue: &mpsc::Sender<T>, item: T) -> Result<(), T> {
    match queue.reserve().await {
        Ok(permit) => {
            permit.send(item);
            Ok(())
        }
        Err(_) => Err(item),
    }
}
