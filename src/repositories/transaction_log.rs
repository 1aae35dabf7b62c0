use crate::error::{AppError, Result};
use crate::models::{NewTransaction, Transaction, TransactionStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Reverse;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Append-only log of transaction records.
///
/// Records are write-once apart from a single PENDING -> terminal status update.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Appends a record in PENDING state and returns it with its assigned id.
    async fn append(&self, record: NewTransaction) -> Result<Transaction>;

    /// Moves a PENDING record to COMPLETED or FAILED.
    /// Fails with `InvalidStateTransition` if the record is already terminal.
    async fn finalize(&self, transaction_id: i64, status: TransactionStatus) -> Result<Transaction>;

    async fn get(&self, transaction_id: i64) -> Result<Transaction>;

    /// Records where the account is either endpoint, newest first.
    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<Transaction>>;

    /// Records touching any of the accounts, each once, newest first.
    async fn list_by_accounts(&self, account_ids: &[Uuid]) -> Result<Vec<Transaction>>;

    /// The `limit` most recent records across all accounts.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Transaction>>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Rejects any finalize that is not PENDING -> terminal.
pub(crate) fn check_finalize(current: &Transaction, next: TransactionStatus) -> Result<()> {
    if current.status.can_transition_to(next) {
        Ok(())
    } else {
        tracing::error!(
            transaction_id = current.id,
            from = current.status.as_str(),
            to = next.as_str(),
            "Rejected finalize of a terminal transaction"
        );
        Err(AppError::InvalidStateTransition(format!(
            "transaction {} cannot move from {} to {}",
            current.id,
            current.status.as_str(),
            next.as_str()
        )))
    }
}

fn newest_first(records: &mut [Transaction]) {
    records.sort_by_key(|tx| Reverse((tx.transaction_date, tx.id)));
}

/// Process-local transaction log. Ids are positions in the log, starting at 1.
#[derive(Default)]
pub struct InMemoryTransactionLog {
    records: RwLock<Vec<Transaction>>,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn index_of(transaction_id: i64) -> Option<usize> {
        usize::try_from(transaction_id).ok()?.checked_sub(1)
    }
}

#[async_trait]
impl TransactionLog for InMemoryTransactionLog {
    async fn append(&self, record: NewTransaction) -> Result<Transaction> {
        let mut records = self.records.write().await;
        let id = records.len() as i64 + 1;

        // Keep dates non-decreasing in id order even if the wall clock steps back.
        let now = Utc::now();
        let transaction_date = match records.last() {
            Some(last) if last.transaction_date > now => last.transaction_date,
            _ => now,
        };

        let transaction = record.into_pending(id, transaction_date);
        records.push(transaction.clone());
        Ok(transaction)
    }

    async fn finalize(&self, transaction_id: i64, status: TransactionStatus) -> Result<Transaction> {
        let mut records = self.records.write().await;
        let record = Self::index_of(transaction_id)
            .and_then(|i| records.get_mut(i))
            .ok_or_else(|| {
                AppError::NotFound(format!("Transaction '{}' not found", transaction_id))
            })?;

        check_finalize(record, status)?;
        record.status = status;
        Ok(record.clone())
    }

    async fn get(&self, transaction_id: i64) -> Result<Transaction> {
        let records = self.records.read().await;
        Self::index_of(transaction_id)
            .and_then(|i| records.get(i))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Transaction '{}' not found", transaction_id)))
    }

    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        self.list_by_accounts(&[account_id]).await
    }

    async fn list_by_accounts(&self, account_ids: &[Uuid]) -> Result<Vec<Transaction>> {
        let mut matching: Vec<Transaction> = self
            .records
            .read()
            .await
            .iter()
            .filter(|tx| account_ids.iter().any(|id| tx.involves(*id)))
            .cloned()
            .collect();
        newest_first(&mut matching);
        Ok(matching)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Transaction>> {
        let mut all = self.records.read().await.clone();
        newest_first(&mut all);
        all.truncate(limit);
        Ok(all)
    }
}
