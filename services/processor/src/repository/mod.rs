//! Transaction persistence
//!
//! The pipeline only writes through `insert_transaction`, and only from the
//! result listener. `get_all_transactions` serves the reporting endpoint.

mod in_memory;
mod postgres;

use async_trait::async_trait;

use crate::domain::Transaction;
use crate::errors::Result;

pub use in_memory::InMemoryTransactionRepository;
pub use postgres::PostgresTransactionRepository;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert one row; a duplicate id is rejected
    async fn insert_transaction(&self, tx: &Transaction) -> Result<()>;
    async fn get_all_transactions(&self) -> Result<Vec<Transaction>>;
}
