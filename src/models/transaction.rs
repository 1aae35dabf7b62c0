use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of ledger operation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Credit to `to_account_id`.
    Deposit,
    /// Debit from `from_account_id`.
    Withdrawal,
    /// Debit from `from_account_id` and credit to `to_account_id`, as one record.
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Transfer => "TRANSFER",
        }
    }

    /// Description used when the caller supplies none.
    pub fn default_description(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "Cash deposit",
            TransactionType::Withdrawal => "Cash withdrawal",
            TransactionType::Transfer => "Fund transfer",
        }
    }
}

/// Lifecycle status of a transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    /// Returns true if the status is terminal.
    pub fn is_final(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }

    /// PENDING may move to COMPLETED or FAILED; nothing else moves.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        *self == TransactionStatus::Pending && next.is_final()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

/// An immutable record of one ledger operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    /// Monotonically increasing in creation order.
    pub id: i64,
    pub transaction_type: TransactionType,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub amount: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub transaction_date: DateTime<Utc>,
}

impl Transaction {
    /// Returns true if the account is either endpoint of this record.
    pub fn involves(&self, account_id: Uuid) -> bool {
        self.from_account_id == Some(account_id) || self.to_account_id == Some(account_id)
    }

    /// Balance effect of this record on the given account, if it completed.
    pub fn net_effect_on(&self, account_id: Uuid) -> Decimal {
        if self.status != TransactionStatus::Completed {
            return Decimal::ZERO;
        }
        let mut effect = Decimal::ZERO;
        if self.to_account_id == Some(account_id) {
            effect += self.amount;
        }
        if self.from_account_id == Some(account_id) {
            effect -= self.amount;
        }
        effect
    }
}

/// A record about to be appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub transaction_type: TransactionType,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub amount: Decimal,
    pub description: String,
}

impl NewTransaction {
    pub fn deposit(to_account_id: Uuid, amount: Decimal, description: Option<String>) -> Self {
        Self::build(TransactionType::Deposit, None, Some(to_account_id), amount, description)
    }

    pub fn withdrawal(from_account_id: Uuid, amount: Decimal, description: Option<String>) -> Self {
        Self::build(TransactionType::Withdrawal, Some(from_account_id), None, amount, description)
    }

    pub fn transfer(
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> Self {
        Self::build(
            TransactionType::Transfer,
            Some(from_account_id),
            Some(to_account_id),
            amount,
            description,
        )
    }

    fn build(
        transaction_type: TransactionType,
        from_account_id: Option<Uuid>,
        to_account_id: Option<Uuid>,
        amount: Decimal,
        description: Option<String>,
    ) -> Self {
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| transaction_type.default_description().to_string());
        Self {
            transaction_type,
            from_account_id,
            to_account_id,
            amount,
            description,
        }
    }

    /// Materializes the record as PENDING with the given id and timestamp.
    pub fn into_pending(self, id: i64, transaction_date: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            transaction_type: self.transaction_type,
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            amount: self.amount,
            description: self.description,
            status: TransactionStatus::Pending,
            transaction_date,
        }
    }
}
