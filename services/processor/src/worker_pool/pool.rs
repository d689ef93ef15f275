//! Worker pool management
//!
//! Owns the input, result and error queues, the cancellation scope, and the
//! lifecycle of every worker and listener task.
//!
//! Shutdown order is fixed: cancel, close the input queue, join workers,
//! close the output queues, join listeners. Closing the output queues any
//! earlier would cut off workers still forwarding; joining listeners any
//! earlier would wait forever on queues that are still open.

use futures::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::domain::{ErrorRecord, Transaction, TransactionStatus};
use crate::errors::{PoolError, ProcessingError};
use crate::repository::TransactionRepository;

use super::listeners::{ErrorListener, ResultListener};
use super::simulation::{self, RngFactory};
use super::worker::{forward, SharedReceiver, Worker, WorkerSettings};

/// Pool of workers for processing transactions
pub struct WorkerPool {
    config: PoolConfig,
    repository: Arc<dyn TransactionRepository>,
    rng_factory: RngFactory,
    cancel: CancellationToken,
    /// `None` once the input queue is closed for writes
    input: RwLock<Option<mpsc::Sender<Transaction>>>,
    queued: SharedReceiver,
    state: Mutex<PoolState>,
    active_tasks: Arc<AtomicUsize>,
}

enum PoolState {
    Idle(OutputQueues),
    Running {
        workers: Vec<JoinHandle<()>>,
        listeners: Vec<JoinHandle<()>>,
        results: mpsc::Sender<Transaction>,
        errors: mpsc::Sender<ErrorRecord>,
    },
    Stopped,
}

struct OutputQueues {
    results_tx: mpsc::Sender<Transaction>,
    results_rx: mpsc::Receiver<Transaction>,
    errors_tx: mpsc::Sender<ErrorRecord>,
    errors_rx: mpsc::Receiver<ErrorRecord>,
}

/// Keeps `active_tasks` accurate even when a task panics
struct TaskGuard(Arc<AtomicUsize>);

impl TaskGuard {
    fn register(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    /// Create a pool whose workers draw from clock-seeded random sources
    pub fn new(
        config: PoolConfig,
        repository: Arc<dyn TransactionRepository>,
    ) -> Result<Self, PoolError> {
        Self::with_rng_factory(config, repository, simulation::clock_seeded_factory())
    }

    /// Create a pool with explicit per-worker random sources
    pub fn with_rng_factory(
        config: PoolConfig,
        repository: Arc<dyn TransactionRepository>,
        rng_factory: RngFactory,
    ) -> Result<Self, PoolError> {
        config.validate()?;

        let (input_tx, input_rx) = mpsc::channel(config.queue_capacity);
        let (results_tx, results_rx) = mpsc::channel(config.queue_capacity);
        let (errors_tx, errors_rx) = mpsc::channel(config.queue_capacity);

        Ok(Self {
            config,
            repository,
            rng_factory,
            cancel: CancellationToken::new(),
            input: RwLock::new(Some(input_tx)),
            queued: Arc::new(Mutex::new(input_rx)),
            state: Mutex::new(PoolState::Idle(OutputQueues {
                results_tx,
                results_rx,
                errors_tx,
                errors_rx,
            })),
            active_tasks: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of worker and listener tasks still alive
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Enqueue a transaction, waiting while the input queue is full.
    ///
    /// Fails with [`PoolError::Closed`] once shutdown has begun.
    pub async fn submit(&self, tx: Transaction) -> Result<(), PoolError> {
        let sender = self.input.read().await.clone();
        let Some(sender) = sender else {
            return Err(self.reject(tx));
        };

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = sender.reserve() => permit.ok(),
        };

        match permit {
            Some(permit) => {
                tracing::trace!(transaction_id = %tx.id, "Transaction submitted");
                permit.send(tx);
                metrics::counter!("transactions_submitted_total").increment(1);
                Ok(())
            }
            None => Err(self.reject(tx)),
        }
    }

    fn reject(&self, tx: Transaction) -> PoolError {
        tracing::error!(transaction_id = %tx.id, "Submit after shutdown, transaction rejected");
        metrics::counter!("transactions_rejected_total").increment(1);
        PoolError::Closed { id: tx.id }
    }

    /// Start all workers and both listeners
    pub async fn start(&self) -> Result<(), PoolError> {
        let mut state = self.state.lock().await;
        let queues = match std::mem::replace(&mut *state, PoolState::Stopped) {
            PoolState::Idle(queues) => queues,
            running @ PoolState::Running { .. } => {
                *state = running;
                return Err(PoolError::AlreadyStarted);
            }
            PoolState::Stopped => return Err(PoolError::ShutDown),
        };
        let OutputQueues {
            results_tx,
            results_rx,
            errors_tx,
            errors_rx,
        } = queues;

        tracing::info!(
            worker_count = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            in_flight_policy = ?self.config.in_flight_policy,
            "Starting worker pool"
        );

        let settings = WorkerSettings::from(&self.config);
        let workers: Vec<JoinHandle<()>> = (0..self.config.worker_count)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    self.queued.clone(),
                    results_tx.clone(),
                    errors_tx.clone(),
                    self.cancel.clone(),
                    settings,
                    (self.rng_factory)(id),
                );
                self.spawn_tracked(worker.run())
            })
            .collect();

        let listeners = vec![
            self.spawn_tracked(
                ResultListener::new(results_rx, self.repository.clone(), self.config.persist_timeout())
                    .run(),
            ),
            self.spawn_tracked(ErrorListener::new(errors_rx).run()),
        ];

        *state = PoolState::Running {
            workers,
            listeners,
            results: results_tx,
            errors: errors_tx,
        };
        Ok(())
    }

    fn spawn_tracked<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = TaskGuard::register(self.active_tasks.clone());
        tokio::spawn(async move {
            let _guard = guard;
            task.await
        })
    }

    /// Stop the pool and wait for every task to exit.
    ///
    /// Transactions still queued when the workers stop are persisted as
    /// `failed` with an abandoned error. Calling this again is a no-op.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, PoolState::Stopped);
        if matches!(previous, PoolState::Stopped) {
            tracing::debug!("Worker pool already stopped");
            return;
        }

        tracing::info!("Stopping worker pool");
        self.cancel.cancel();
        self.input.write().await.take();

        match previous {
            PoolState::Idle(_) => {
                let discarded = self.discard_queued().await;
                if discarded > 0 {
                    tracing::warn!(discarded, "Worker pool was never started, queued transactions discarded");
                }
            }
            PoolState::Running {
                workers,
                listeners,
                results,
                errors,
            } => {
                for outcome in join_all(workers).await {
                    if let Err(e) = outcome {
                        tracing::error!(error = %e, "Worker task failed");
                    }
                }

                let abandoned = self.forward_abandoned(&results, &errors).await;
                drop(results);
                drop(errors);

                for outcome in join_all(listeners).await {
                    if let Err(e) = outcome {
                        tracing::error!(error = %e, "Listener task failed");
                    }
                }

                tracing::info!(abandoned, "Worker pool stopped");
            }
            PoolState::Stopped => {}
        }
    }

    /// Close the input queue for good and settle whatever is left in it.
    ///
    /// Must run after every worker has exited.
    async fn forward_abandoned(
        &self,
        results: &mpsc::Sender<Transaction>,
        errors: &mpsc::Sender<ErrorRecord>,
    ) -> usize {
        let mut queued = self.queued.lock().await;
        queued.close();

        let mut abandoned = 0;
        while let Some(mut tx) = queued.recv().await {
            abandoned += 1;
            tx.settle(TransactionStatus::Failed);
            let error = ProcessingError::Abandoned { id: tx.id.clone() };

            if forward(errors, ErrorRecord::new(tx.clone(), error)).await.is_err() {
                tracing::error!(transaction_id = %tx.id, "Error queue unavailable, error record dropped");
            }
            if let Err(tx) = forward(results, tx).await {
                tracing::error!(transaction_id = %tx.id, "Result queue unavailable, transaction outcome dropped");
                metrics::counter!("transactions_dropped_total", "queue" => "result").increment(1);
            }
        }
        abandoned
    }

    async fn discard_queued(&self) -> usize {
        let mut queued = self.queued.lock().await;
        queued.close();

        let mut discarded = 0;
        while let Some(tx) = queued.recv().await {
            discarded += 1;
            tracing::warn!(transaction_id = %tx.id, "Discarding transaction queued on a pool that never started");
        }
        discarded
    }
}
