use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::Transaction;
use crate::errors::{RepositoryError, Result};

use super::TransactionRepository;

/// A thread-safe in-memory transaction store.
///
/// Keeps insertion order so reads come back the way they were written.
/// Used by tests and by local runs without a database.
#[derive(Default, Clone)]
pub struct InMemoryTransactionRepository {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    rows: HashMap<String, Transaction>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, id: &str) -> Option<Transaction> {
        self.inner.read().await.rows.get(id).cloned()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.rows.contains_key(&tx.id) {
            return Err(RepositoryError::Duplicate(tx.id.clone()));
        }
        inner.order.push(tx.id.clone());
        inner.rows.insert(tx.id.clone(), tx.clone());
        Ok(())
    }

    async fn get_all_transactions(&self) -> Result<Vec<Transaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.rows.get(id).cloned())
            .collect())
    }
}
