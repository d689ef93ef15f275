use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::TransactionMessage;
use thiserror::Error;

use crate::errors::ProcessingError;

pub use shared::TransactionStatus;

/// A transaction flowing through the pipeline.
///
/// Everything except the status is fixed at ingestion. The status starts as
/// `pending` and can be settled exactly once, by the worker (or the pool at
/// shutdown) that owns the transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub amount: i64,
    pub asset: String,
    pub created_at: DateTime<Utc>,
    status: TransactionStatus,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        amount: i64,
        asset: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            amount,
            asset: asset.into(),
            created_at,
            status: TransactionStatus::Pending,
        }
    }

    /// Rebuild a transaction read back from storage
    pub(crate) fn restore(
        id: String,
        account_id: String,
        amount: i64,
        asset: String,
        created_at: DateTime<Utc>,
        status: TransactionStatus,
    ) -> Self {
        Self {
            id,
            account_id,
            amount,
            asset,
            created_at,
            status,
        }
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Move a pending transaction to a terminal status.
    ///
    /// Returns `false` and leaves the status untouched if the transaction is
    /// already settled or `status` is not terminal.
    pub(crate) fn settle(&mut self, status: TransactionStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}

impl From<TransactionMessage> for Transaction {
    fn from(msg: TransactionMessage) -> Self {
        // Upstream status is informational only
        Transaction::new(msg.id, msg.account_id, msg.amount, msg.asset, msg.created_at)
    }
}

/// A hard processing failure routed to the error listener
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub transaction: Transaction,
    pub error: ProcessingError,
}

impl ErrorRecord {
    pub fn new(transaction: Transaction, error: ProcessingError) -> Self {
        Self { transaction, error }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to unmarshal transaction: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transaction field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// Parse a queue payload into a pending transaction
pub fn parse_transaction(payload: &[u8]) -> Result<Transaction, ParseError> {
    let msg: TransactionMessage = serde_json::from_slice(payload)?;

    if msg.id.trim().is_empty() {
        return Err(ParseError::EmptyField("id"));
    }
    if msg.account_id.trim().is_empty() {
        return Err(ParseError::EmptyField("account_id"));
    }
    if msg.asset.trim().is_empty() {
        return Err(ParseError::EmptyField("asset"));
    }

    Ok(msg.into())
}
