use crate::error::{AppError, Result};
use crate::models::{Account, AccountNumberGenerator, RandomAccountNumbers};
use crate::repositories::account_store::{AccountStore, DEFAULT_NUMBER_ATTEMPTS};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// Balance updates that overflow the column are the caller's amount, not a fault.
fn balance_error(error: sqlx::Error, account_id: Uuid) -> AppError {
    let out_of_range = matches!(
        &error,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE)
    );
    if out_of_range {
        AppError::InvalidAmount(format!("account '{}': balance out of range", account_id))
    } else {
        AppError::Database(error)
    }
}

/// PostgreSQL-backed account store.
pub struct AccountRepository {
    pool: PgPool,
    numbers: Arc<dyn AccountNumberGenerator>,
    number_attempts: u32,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            numbers: Arc::new(RandomAccountNumbers),
            number_attempts: DEFAULT_NUMBER_ATTEMPTS,
        }
    }

    pub fn with_number_attempts(mut self, number_attempts: u32) -> Self {
        self.number_attempts = number_attempts;
        self
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner_id, account_number, account_type, balance, opening_balance, created_at, updated_at
            FROM accounts
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
impl AccountStore for AccountRepository {
    async fn get(&self, account_id: Uuid) -> Result<Account> {
        self.find_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account '{}' not found", account_id)))
    }

    async fn find_by_number(&self, account_number: &str) -> Result<Account> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner_id, account_number, account_type, balance, opening_balance, created_at, updated_at
            FROM accounts
            WHERE account_number = $1
            "#,
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| {
            AppError::NotFound(format!("Account with number '{}' not found", account_number))
        })
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner_id, account_number, account_type, balance, opening_balance, created_at, updated_at
            FROM accounts
            WHERE owner_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    async fn insert(&self, account: Account) -> Result<Account> {
        let result = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, owner_id, account_number, account_type, balance, opening_balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, owner_id, account_number, account_type, balance, opening_balance, created_at, updated_at
            "#,
        )
        .bind(account.id)
        .bind(&account.owner_id)
        .bind(&account.account_number)
        .bind(account.account_type)
        .bind(account.balance)
        .bind(account.opening_balance)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                    && db_err.constraint() == Some("accounts_account_number_key") =>
            {
                Err(AppError::DuplicateAccountNumber(account.account_number))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn apply_delta(&self, account_id: Uuid, delta: Decimal) -> Result<Decimal> {
        // Single conditional UPDATE: the row lock makes the read-modify-write indivisible.
        let updated = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE accounts
            SET balance = balance + $2,
                updated_at = NOW()
            WHERE id = $1
              AND balance + $2 >= 0
            RETURNING balance
            "#,
        )
        .bind(account_id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| balance_error(e, account_id))?;

        if let Some(balance) = updated {
            return Ok(balance);
        }

        match self.find_by_id(account_id).await? {
            Some(account) => Err(AppError::InsufficientFunds(format!(
                "account '{}': requested {}, available {}",
                account_id, -delta, account.balance
            ))),
            None => Err(AppError::NotFound(format!("Account '{}' not found", account_id))),
        }
    }

    async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal)> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        // Lock both rows in id order so opposing transfers cannot deadlock.
        let locked = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM accounts
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(vec![from_account_id, to_account_id])
        .fetch_all(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        for account_id in [from_account_id, to_account_id] {
            if !locked.contains(&account_id) {
                return Err(AppError::NotFound(format!("Account '{}' not found", account_id)));
            }
        }

        let from_balance = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE accounts
            SET balance = balance - $2,
                updated_at = NOW()
            WHERE id = $1
              AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(from_account_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| balance_error(e, from_account_id))?;

        let Some(from_balance) = from_balance else {
            let available = sqlx::query_scalar::<_, Decimal>("SELECT balance FROM accounts WHERE id = $1")
                .bind(from_account_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::Database)?;
            return Err(AppError::InsufficientFunds(format!(
                "account '{}': requested {}, available {}",
                from_account_id, amount, available
            )));
        };

        let to_balance = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE accounts
            SET balance = balance + $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING balance
            "#,
        )
        .bind(to_account_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| balance_error(e, to_account_id))?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok((from_balance, to_balance))
    }

    fn account_numbers(&self) -> &dyn AccountNumberGenerator {
        self.numbers.as_ref()
    }

    fn number_attempts(&self) -> u32 {
        self.number_attempts
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
