//! Concurrent transaction processing pipeline
//!
//! Transactions arrive on a Redis stream, are processed by a bounded worker
//! pool and persisted to Postgres.

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod ingestion;
pub mod repository;
pub mod worker_pool;

pub use config::{Config, InFlightPolicy, PoolConfig};
pub use domain::{ErrorRecord, Transaction, TransactionStatus};
pub use errors::{PoolError, ProcessingError, RepositoryError};
pub use repository::{InMemoryTransactionRepository, PostgresTransactionRepository, TransactionRepository};
pub use worker_pool::WorkerPool;
