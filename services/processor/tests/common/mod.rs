#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use processor::domain::Transaction;
use processor::errors::Result;
use processor::repository::{InMemoryTransactionRepository, TransactionRepository};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Store that counts insert attempts per id before delegating
#[derive(Default, Clone)]
pub struct RecordingRepository {
    inner: InMemoryTransactionRepository,
    attempts: Arc<Mutex<HashMap<String, usize>>>,
    insert_delay: Duration,
}

impl RecordingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every insert succeeds, but only after `delay`
    pub fn with_insert_delay(delay: Duration) -> Self {
        Self {
            insert_delay: delay,
            ..Self::default()
        }
    }

    pub async fn attempts(&self, id: &str) -> usize {
        self.attempts.lock().await.get(id).copied().unwrap_or(0)
    }

    pub async fn total_attempts(&self) -> usize {
        self.attempts.lock().await.values().sum()
    }

    pub async fn stored(&self) -> Vec<Transaction> {
        self.inner.get_all_transactions().await.unwrap()
    }
}

#[async_trait]
impl TransactionRepository for RecordingRepository {
    async fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        *self.attempts.lock().await.entry(tx.id.clone()).or_default() += 1;
        if !self.insert_delay.is_zero() {
            tokio::time::sleep(self.insert_delay).await;
        }
        self.inner.insert_transaction(tx).await
    }

    async fn get_all_transactions(&self) -> Result<Vec<Transaction>> {
        self.inner.get_all_transactions().await
    }
}

pub fn tx(id: &str, amount: i64, asset: &str) -> Transaction {
    Transaction::new(id, format!("acc_{}", id), amount, asset, Utc::now())
}

pub fn repository() -> Arc<RecordingRepository> {
    Arc::new(RecordingRepository::new())
}
