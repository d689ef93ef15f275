//! Publishes random transactions to the incoming stream for local testing

use anyhow::{Context, Result};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use redis::AsyncCommands;
use shared::constants::{PAYLOAD_FIELD, TRANSACTIONS_STREAM};
use shared::TransactionMessage;
use std::time::Duration;

const ASSETS: [&str; 4] = ["USD", "EUR", "BTC", "ETH"];

fn random_transaction(rng: &mut impl Rng) -> TransactionMessage {
    TransactionMessage {
        id: uuid::Uuid::new_v4().to_string(),
        account_id: format!("acc_{}", rng.gen_range(1..=1000)),
        amount: rng.gen_range(-10_000..=10_000),
        asset: ASSETS.choose(rng).copied().unwrap_or("USD").to_string(),
        created_at: Utc::now(),
        status: Some("pending".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "producer=info".into()),
        )
        .init();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let stream = std::env::var("TRANSACTIONS_STREAM").unwrap_or_else(|_| TRANSACTIONS_STREAM.to_string());
    let interval_ms: u64 = std::env::var("PRODUCER_INTERVAL_MS")
        .unwrap_or_else(|_| "100".to_string())
        .parse()?;
    let limit: Option<u64> = std::env::var("PRODUCER_LIMIT")
        .ok()
        .map(|v| v.parse())
        .transpose()?;

    let client = redis::Client::open(redis_url.clone())?;
    let mut conn = client
        .get_connection_manager()
        .await
        .with_context(|| format!("failed to connect to {}", redis_url))?;

    tracing::info!(stream = %stream, interval_ms, limit = ?limit, "Producer started");

    let mut rng = rand::thread_rng();
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let mut published: u64 = 0;

    loop {
        if limit.is_some_and(|limit| published >= limit) {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {}
        }

        let msg = random_transaction(&mut rng);
        let payload = serde_json::to_string(&msg)?;
        let entry_id: String = conn
            .xadd(&stream, "*", &[(PAYLOAD_FIELD, payload)])
            .await
            .context("XADD failed")?;

        published += 1;
        tracing::debug!(transaction_id = %msg.id, entry_id = %entry_id, "Published transaction");
    }

    tracing::info!(published, "Producer stopped");
    Ok(())
}
