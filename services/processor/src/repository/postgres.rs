use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

use crate::domain::{Transaction, TransactionStatus};
use crate::errors::{RepositoryError, Result};

use super::TransactionRepository;

pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool and apply pending migrations
    pub async fn connect(url: &str, pool_size: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .max_lifetime(Duration::from_secs(3600))
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Transactions table migrated");

        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, account_id, amount, asset, created_at, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.account_id)
        .bind(tx.amount)
        .bind(&tx.asset)
        .bind(tx.created_at)
        .bind(tx.status().as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, &tx.id))?;

        Ok(())
    }

    async fn get_all_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, asset, created_at, status
            FROM transactions
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }
}

fn insert_error(error: sqlx::Error, id: &str) -> RepositoryError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_unique_violation() {
            return RepositoryError::Duplicate(id.to_string());
        }
    }
    RepositoryError::Database(error)
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction> {
    let status: String = row.try_get("status")?;
    let status: TransactionStatus = status
        .parse()
        .map_err(|e: shared::UnknownStatus| RepositoryError::InvalidRow(e.to_string()))?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Transaction::restore(
        row.try_get("id")?,
        row.try_get("account_id")?,
        row.try_get("amount")?,
        row.try_get("asset")?,
        created_at,
        status,
    ))
}
