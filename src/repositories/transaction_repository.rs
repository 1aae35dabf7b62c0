use crate::error::{AppError, Result};
use crate::models::{NewTransaction, Transaction, TransactionStatus};
use crate::repositories::transaction_log::{check_finalize, TransactionLog};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL-backed transaction log.
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, transaction_type, from_account_id, to_account_id, amount, description, status, transaction_date
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}

#[async_trait]
impl TransactionLog for TransactionRepository {
    async fn append(&self, record: NewTransaction) -> Result<Transaction> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (transaction_type, from_account_id, to_account_id, amount, description, status, transaction_date)
            VALUES ($1, $2, $3, $4, $5, 'PENDING', $6)
            RETURNING id, transaction_type, from_account_id, to_account_id, amount, description, status, transaction_date
            "#,
        )
        .bind(record.transaction_type)
        .bind(record.from_account_id)
        .bind(record.to_account_id)
        .bind(record.amount)
        .bind(&record.description)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn finalize(&self, transaction_id: i64, status: TransactionStatus) -> Result<Transaction> {
        let updated = if status.is_final() {
            sqlx::query_as::<_, Transaction>(
                r#"
                UPDATE transactions
                SET status = $2
                WHERE id = $1 AND status = 'PENDING'
                RETURNING id, transaction_type, from_account_id, to_account_id, amount, description, status, transaction_date
                "#,
            )
            .bind(transaction_id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?
        } else {
            None
        };

        if let Some(row) = updated {
            return Ok(row);
        }

        let current = self.find_by_id(transaction_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Transaction '{}' not found", transaction_id))
        })?;
        check_finalize(&current, status)?;

        // Lost a race with a concurrent finalize between the UPDATE and the re-read.
        tracing::error!(transaction_id, "Transaction finalized concurrently");
        Err(AppError::InvalidStateTransition(format!(
            "transaction {} was finalized concurrently",
            transaction_id
        )))
    }

    async fn get(&self, transaction_id: i64) -> Result<Transaction> {
        self.find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction '{}' not found", transaction_id)))
    }

    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        self.list_by_accounts(&[account_id]).await
    }

    async fn list_by_accounts(&self, account_ids: &[Uuid]) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, transaction_type, from_account_id, to_account_id, amount, description, status, transaction_date
            FROM transactions
            WHERE from_account_id = ANY($1) OR to_account_id = ANY($1)
            ORDER BY transaction_date DESC, id DESC
            "#,
        )
        .bind(account_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, transaction_type, from_account_id, to_account_id, amount, description, status, transaction_date
            FROM transactions
            ORDER BY transaction_date DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
