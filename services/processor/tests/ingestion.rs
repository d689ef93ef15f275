mod common;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use processor::config::PoolConfig;
use processor::errors::PoolError;
use processor::ingestion::{Delivery, Ingestor, MessageSource};
use processor::worker_pool::{seeded_factory, WorkerPool};

use common::{repository, RecordingRepository};

/// Replays prepared batches, then reports itself exhausted
struct VecSource {
    batches: VecDeque<Vec<Delivery>>,
    acked: Arc<Mutex<Vec<String>>>,
}

impl VecSource {
    fn new(batches: Vec<Vec<Delivery>>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let acked = Arc::new(Mutex::new(Vec::new()));
        let source = Self {
            batches: batches.into(),
            acked: acked.clone(),
        };
        (source, acked)
    }
}

#[async_trait]
impl MessageSource for VecSource {
    async fn next_batch(&mut self) -> anyhow::Result<Option<Vec<Delivery>>> {
        Ok(self.batches.pop_front())
    }

    async fn ack(&mut self, ids: &[String]) -> anyhow::Result<()> {
        self.acked.lock().await.extend_from_slice(ids);
        Ok(())
    }
}

fn message(entry: &str, id: &str) -> Delivery {
    let payload = format!(
        r#"{{"id":"{}","account_id":"acc_1","amount":250,"asset":"USD","created_at":"2024-05-01T12:00:00Z","status":"pending"}}"#,
        id
    );
    Delivery::new(entry, payload)
}

fn pool(repository: &Arc<RecordingRepository>) -> Arc<WorkerPool> {
    let config = PoolConfig {
        worker_count: 2,
        queue_capacity: 4,
        simulated_latency_ms: 5,
        ..PoolConfig::default()
    };
    Arc::new(WorkerPool::with_rng_factory(config, repository.clone(), seeded_factory(3)).unwrap())
}

#[tokio::test]
async fn test_malformed_messages_are_acked_but_never_submitted() {
    let repository = repository();
    let pool = pool(&repository);
    pool.start().await.unwrap();

    let (source, acked) = VecSource::new(vec![
        vec![message("1-0", "good-1"), Delivery::new("1-1", "not json")],
        vec![
            Delivery::new("2-0", r#"{"id":"","account_id":"acc","amount":1,"asset":"USD","created_at":"2024-05-01T12:00:00Z"}"#),
            Delivery::new("2-1", r#"{"id":"missing-fields"}"#),
            message("2-2", "good-2"),
        ],
    ]);

    let stats = Ingestor::new(source, pool.clone())
        .run(CancellationToken::new())
        .await
        .unwrap();
    pool.shutdown().await;

    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.malformed, 3);
    assert_eq!(*acked.lock().await, vec!["1-0", "1-1", "2-0", "2-1", "2-2"]);

    assert_eq!(repository.total_attempts().await, 2);
    assert_eq!(repository.attempts("good-1").await, 1);
    assert_eq!(repository.attempts("good-2").await, 1);
}

#[tokio::test]
async fn test_ingestor_stops_when_pool_is_closed() {
    let repository = repository();
    let pool = pool(&repository);
    pool.start().await.unwrap();
    pool.shutdown().await;

    let (source, acked) = VecSource::new(vec![vec![
        Delivery::new("1-0", "garbage"),
        message("1-1", "late"),
        message("1-2", "later"),
    ]]);

    let error = Ingestor::new(source, pool.clone())
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        error.downcast_ref::<PoolError>(),
        Some(PoolError::Closed { .. })
    ));
    // Only what was handled before the refusal is acknowledged
    assert_eq!(*acked.lock().await, vec!["1-0"]);
    assert_eq!(repository.total_attempts().await, 0);
}

#[tokio::test]
async fn test_ingestor_honours_cancellation() {
    let repository = repository();
    let pool = pool(&repository);

    let (source, acked) = VecSource::new(vec![vec![message("1-0", "never")]]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stats = Ingestor::new(source, pool.clone()).run(cancel).await.unwrap();
    pool.shutdown().await;

    assert_eq!(stats.submitted, 0);
    assert!(acked.lock().await.is_empty());
}
