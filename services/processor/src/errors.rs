use shared::errors::ErrorCode;
use std::time::Duration;

/// Hard failures raised while processing a single transaction.
///
/// None of these stop a worker; the transaction is marked `failed` and still
/// persisted, and a copy is routed to the error listener.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessingError {
    #[error("Processing error for {id}")]
    Simulated { id: String },

    #[error("Processing of {id} exceeded its {timeout:?} deadline")]
    DeadlineExceeded { id: String, timeout: Duration },

    #[error("Processing of {id} was cancelled by shutdown")]
    Cancelled { id: String },

    #[error("Transaction {id} was still queued when the pool shut down")]
    Abandoned { id: String },
}

impl ProcessingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProcessingError::Simulated { .. } => ErrorCode::PROCESSING_SIMULATED_FAILURE,
            ProcessingError::DeadlineExceeded { .. } => ErrorCode::PROCESSING_DEADLINE_EXCEEDED,
            ProcessingError::Cancelled { .. } => ErrorCode::PROCESSING_CANCELLED,
            ProcessingError::Abandoned { .. } => ErrorCode::PROCESSING_ABANDONED,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker pool already started")]
    AlreadyStarted,

    #[error("Worker pool has been shut down")]
    ShutDown,

    #[error("Worker pool is closed; transaction {id} was not accepted")]
    Closed { id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Transaction {0} already exists")]
    Duplicate(String),

    #[error("Invalid stored transaction: {0}")]
    InvalidRow(String),
}

impl RepositoryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RepositoryError::Database(_) => ErrorCode::NETWORK_DATABASE_CONNECTION,
            RepositoryError::Duplicate(_) => ErrorCode::INTERNAL_DUPLICATE_TRANSACTION,
            RepositoryError::Migration(_) | RepositoryError::InvalidRow(_) => {
                ErrorCode::INTERNAL_UNEXPECTED
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
