//! Result and error fan-in
//!
//! Each listener is the single consumer of one output queue and runs until
//! that queue is closed and drained. The result listener is the only writer
//! of the transaction store.

use shared::errors::ServiceError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::domain::{ErrorRecord, Transaction};
use crate::repository::TransactionRepository;

pub struct ResultListener {
    results: mpsc::Receiver<Transaction>,
    repository: Arc<dyn TransactionRepository>,
    persist_timeout: Duration,
}

impl ResultListener {
    pub fn new(
        results: mpsc::Receiver<Transaction>,
        repository: Arc<dyn TransactionRepository>,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            results,
            repository,
            persist_timeout,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!("Result listener started");
        let mut persisted: u64 = 0;
        let mut failed: u64 = 0;

        while let Some(tx) = self.results.recv().await {
            match timeout(self.persist_timeout, self.repository.insert_transaction(&tx)).await {
                Ok(Ok(())) => {
                    persisted += 1;
                    metrics::counter!("transactions_persisted_total").increment(1);
                }
                Ok(Err(e)) => {
                    failed += 1;
                    tracing::error!(
                        transaction_id = %tx.id,
                        status = %tx.status(),
                        error_code = %e.code(),
                        error = %e,
                        "Failed to save transaction"
                    );
                    metrics::counter!("transaction_persist_failures_total", "reason" => "error")
                        .increment(1);
                }
                Err(_) => {
                    failed += 1;
                    let error = ServiceError::database_timeout(self.persist_timeout);
                    tracing::error!(
                        transaction_id = %tx.id,
                        status = %tx.status(),
                        error_code = %error.code,
                        error = %error,
                        "Timed out saving transaction"
                    );
                    metrics::counter!("transaction_persist_failures_total", "reason" => "timeout")
                        .increment(1);
                }
            }
        }

        tracing::info!(persisted, failed, "Result queue closed, result listener stopped");
    }
}

pub struct ErrorListener {
    errors: mpsc::Receiver<ErrorRecord>,
}

impl ErrorListener {
    pub fn new(errors: mpsc::Receiver<ErrorRecord>) -> Self {
        Self { errors }
    }

    pub async fn run(mut self) {
        tracing::debug!("Error listener started");
        let mut received: u64 = 0;

        while let Some(record) = self.errors.recv().await {
            received += 1;
            let code = record.error.code();

            tracing::error!(
                transaction_id = %record.transaction.id,
                account_id = %record.transaction.account_id,
                error_code = %code,
                error = %record.error,
                "Error processing transaction"
            );
            metrics::counter!("transaction_errors_total", "code" => code.as_str()).increment(1);
        }

        tracing::info!(received, "Error queue closed, error listener stopped");
    }
}
