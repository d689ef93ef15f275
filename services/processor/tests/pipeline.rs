mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use processor::config::{InFlightPolicy, PoolConfig};
use processor::domain::TransactionStatus;
use processor::errors::PoolError;
use processor::worker_pool::{seeded_factory, sequence_factory, RandomSource, RngFactory, WorkerPool};
use tokio_test::{assert_pending, task};

use common::{repository, tx, RecordingRepository};

fn config(worker_count: usize, queue_capacity: usize, latency_ms: u64) -> PoolConfig {
    PoolConfig {
        worker_count,
        queue_capacity,
        simulated_latency_ms: latency_ms,
        ..PoolConfig::default()
    }
}

fn pool_with(config: PoolConfig, repository: &Arc<RecordingRepository>) -> WorkerPool {
    WorkerPool::with_rng_factory(config, repository.clone(), seeded_factory(42)).unwrap()
}

async fn wait_for_stored(repository: &RecordingRepository, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while repository.total_attempts().await < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workers should persist every submitted transaction");
}

#[tokio::test]
async fn test_three_transactions_are_each_persisted_once() {
    let repository = repository();
    let pool = pool_with(config(3, 10, 10), &repository);
    pool.start().await.unwrap();

    pool.submit(tx("A", 100, "USD")).await.unwrap();
    pool.submit(tx("B", 200, "EUR")).await.unwrap();
    pool.submit(tx("C", 300, "JPY")).await.unwrap();
    pool.shutdown().await;

    assert_eq!(repository.total_attempts().await, 3);
    for id in ["A", "B", "C"] {
        assert_eq!(repository.attempts(id).await, 1, "inserts for {}", id);
    }

    let stored = repository.stored().await;
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|tx| tx.status().is_terminal()));

    // Queues are closed once the pool is down
    let late = pool.submit(tx("D", 400, "USD")).await;
    assert!(matches!(late, Err(PoolError::Closed { ref id }) if id == "D"));
    assert_eq!(repository.attempts("D").await, 0);
}

#[tokio::test]
async fn test_submit_blocks_while_input_queue_is_full() {
    let repository = repository();
    let pool = pool_with(config(1, 2, 10), &repository);

    pool.submit(tx("a", 1, "USD")).await.unwrap();
    pool.submit(tx("b", 2, "USD")).await.unwrap();

    let mut third = task::spawn(pool.submit(tx("c", 3, "USD")));
    assert_pending!(third.poll());

    pool.start().await.unwrap();

    let submitted = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Poll::Ready(result) = third.poll() {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("submit should complete once a worker frees capacity");
    assert!(submitted.is_ok());
    drop(third);

    pool.shutdown().await;
    assert_eq!(repository.stored().await.len(), 3);
}

#[tokio::test]
async fn test_shutdown_mid_delay_still_persists_terminal_status() {
    let repository = repository();
    let pool = pool_with(config(1, 4, 300), &repository);
    pool.start().await.unwrap();

    pool.submit(tx("busy", 10, "BTC")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.shutdown().await;

    let stored = repository.stored().await;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].status().is_terminal());
}

#[tokio::test]
async fn test_abort_policy_fails_in_flight_transaction() {
    let repository = repository();
    let config = PoolConfig {
        in_flight_policy: InFlightPolicy::Abort,
        ..config(1, 4, 5_000)
    };
    let pool = pool_with(config, &repository);
    pool.start().await.unwrap();

    pool.submit(tx("aborted", 10, "ETH")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), pool.shutdown())
        .await
        .expect("abort policy should not wait out the simulated delay");

    let stored = repository.stored().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status(), TransactionStatus::Failed);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let repository = repository();
    let pool = pool_with(config(4, 8, 20), &repository);
    pool.start().await.unwrap();
    pool.submit(tx("x", 1, "USD")).await.unwrap();

    tokio::join!(pool.shutdown(), pool.shutdown());
    pool.shutdown().await;

    assert_eq!(pool.active_tasks(), 0);
    assert_eq!(repository.attempts("x").await, 1);
}

#[tokio::test]
async fn test_shutdown_finishes_within_item_deadline() {
    let repository = repository();
    let config = PoolConfig {
        item_timeout_ms: 100,
        ..config(2, 4, 10_000)
    };
    let pool = pool_with(config, &repository);
    pool.start().await.unwrap();
    pool.submit(tx("slow-1", 1, "USD")).await.unwrap();
    pool.submit(tx("slow-2", 2, "USD")).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), pool.shutdown())
        .await
        .expect("shutdown should be bounded by the per-item deadline");

    let stored = repository.stored().await;
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|tx| tx.status() == TransactionStatus::Failed));
}

/// Counts every outcome decision made by any worker
struct CountingSource {
    decisions: Arc<AtomicUsize>,
    draw: f64,
}

impl RandomSource for CountingSource {
    fn next_draw(&mut self) -> f64 {
        self.decisions.fetch_add(1, Ordering::SeqCst);
        self.draw
    }
}

fn counting_factory(decisions: Arc<AtomicUsize>) -> RngFactory {
    Arc::new(move |_| -> Box<dyn RandomSource> {
        Box::new(CountingSource {
            decisions: decisions.clone(),
            draw: 0.7,
        })
    })
}

#[tokio::test]
async fn test_each_transaction_is_processed_by_exactly_one_worker() {
    let repository = repository();
    let decisions = Arc::new(AtomicUsize::new(0));
    let pool = Arc::new(
        WorkerPool::with_rng_factory(config(4, 8, 5), repository.clone(), counting_factory(decisions.clone()))
            .unwrap(),
    );
    pool.start().await.unwrap();

    let producer = tokio::spawn({
        let pool = pool.clone();
        async move {
            for i in 0..50 {
                pool.submit(tx(&format!("tx-{i}"), i, "USD")).await.unwrap();
            }
        }
    });
    producer.await.unwrap();
    wait_for_stored(&repository, 50).await;
    pool.shutdown().await;

    // One decision per transaction: nothing was simulated twice
    assert_eq!(decisions.load(Ordering::SeqCst), 50);

    let stored = repository.stored().await;
    assert_eq!(stored.len(), 50);
    assert!(stored.iter().all(|tx| tx.status() != TransactionStatus::Pending));
    for i in 0..50 {
        assert_eq!(repository.attempts(&format!("tx-{i}")).await, 1);
    }
}

#[tokio::test]
async fn test_slow_store_still_receives_every_result_after_shutdown() {
    // Each insert takes longer than the item deadline, and the result queue
    // holds one item, so most workers are still waiting to forward at shutdown
    let repository = Arc::new(RecordingRepository::with_insert_delay(Duration::from_millis(50)));
    let config = PoolConfig {
        item_timeout_ms: 100,
        ..config(8, 1, 5)
    };
    let pool = pool_with(config, &repository);
    pool.start().await.unwrap();

    for i in 0..8 {
        pool.submit(tx(&format!("slow-{i}"), i, "USD")).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(40)).await;
    pool.shutdown().await;

    assert_eq!(repository.total_attempts().await, 8);
    let stored = repository.stored().await;
    assert_eq!(stored.len(), 8);
    assert!(stored.iter().all(|tx| tx.status().is_terminal()));
    assert_eq!(pool.active_tasks(), 0);
}

#[tokio::test]
async fn test_fixed_draws_drive_outcomes() {
    for (draw, expected) in [(0.1, TransactionStatus::Failed), (0.9, TransactionStatus::Completed)] {
        let repository = repository();
        let pool = WorkerPool::with_rng_factory(
            config(2, 8, 5),
            repository.clone(),
            sequence_factory(vec![draw]).unwrap(),
        )
        .unwrap();
        pool.start().await.unwrap();

        for i in 0..6 {
            pool.submit(tx(&format!("d{i}"), i, "EUR")).await.unwrap();
        }
        // Let the workers drain the queue so nothing is abandoned at shutdown
        wait_for_stored(&repository, 6).await;
        pool.shutdown().await;

        let stored = repository.stored().await;
        assert_eq!(stored.len(), 6);
        assert!(stored.iter().all(|tx| tx.status() == expected), "draw {}", draw);
    }
}

#[tokio::test]
async fn test_submit_before_start_is_processed_after_start() {
    let repository = repository();
    let pool = pool_with(config(2, 4, 5), &repository);

    pool.submit(tx("early", 5, "USD")).await.unwrap();
    pool.start().await.unwrap();
    pool.shutdown().await;

    assert_eq!(repository.attempts("early").await, 1);
}
