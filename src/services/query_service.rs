use crate::error::{AppError, Result};
use crate::models::{Transaction, TransactionStatus, TransactionType};
use crate::repositories::{AccountStore, TransactionLog};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Dashboard totals for one owner. A point-in-time snapshot, not atomic
/// across accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub owner_id: String,
    pub total_balance: Decimal,
    pub account_count: usize,
    pub transaction_count: usize,
}

/// Totals of an account's COMPLETED records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTransactionSummary {
    pub account_id: Uuid,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub transfers_in: Decimal,
    pub transfers_out: Decimal,
    /// Incoming minus outgoing transfers.
    pub net_transfers: Decimal,
    pub net_amount: Decimal,
    pub completed_count: usize,
    pub failed_count: usize,
}

/// Expected balance from the log compared with the stored balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub account_id: Uuid,
    pub opening_balance: Decimal,
    pub completed_credits: Decimal,
    pub completed_debits: Decimal,
    pub expected_balance: Decimal,
    pub actual_balance: Decimal,
    pub balanced: bool,
}

/// Read-only projections over the account store and transaction log.
#[derive(Clone)]
pub struct QueryService {
    accounts: Arc<dyn AccountStore>,
    transactions: Arc<dyn TransactionLog>,
}

impl QueryService {
    pub fn new(accounts: Arc<dyn AccountStore>, transactions: Arc<dyn TransactionLog>) -> Self {
        Self {
            accounts,
            transactions,
        }
    }

    /// Records touching the account, newest first.
    pub async fn history(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        self.accounts.get(account_id).await?;
        self.transactions.list_by_account(account_id).await
    }

    /// Records touching any of the owner's accounts, each once, newest first.
    pub async fn owner_history(&self, owner_id: &str) -> Result<Vec<Transaction>> {
        let ids: Vec<Uuid> = self
            .accounts
            .list_by_owner(owner_id)
            .await?
            .iter()
            .map(|account| account.id)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.transactions.list_by_accounts(&ids).await
    }

    pub async fn summary(&self, owner_id: &str) -> Result<OwnerSummary> {
        let accounts = self.accounts.list_by_owner(owner_id).await?;
        let total_balance = accounts.iter().map(|account| account.balance).sum();
        let transaction_count = self.owner_history(owner_id).await?.len();

        Ok(OwnerSummary {
            owner_id: owner_id.to_string(),
            total_balance,
            account_count: accounts.len(),
            transaction_count,
        })
    }

    /// The `limit` most recent records across all accounts.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Transaction>> {
        if limit == 0 {
            return Err(AppError::Validation("limit must be greater than zero".to_string()));
        }
        self.transactions.list_recent(limit).await
    }

    pub async fn transaction(&self, transaction_id: i64) -> Result<Transaction> {
        self.transactions.get(transaction_id).await
    }

    pub async fn account_summary(&self, account_id: Uuid) -> Result<AccountTransactionSummary> {
        let history = self.history(account_id).await?;

        let mut summary = AccountTransactionSummary {
            account_id,
            total_deposits: Decimal::ZERO,
            total_withdrawals: Decimal::ZERO,
            transfers_in: Decimal::ZERO,
            transfers_out: Decimal::ZERO,
            net_transfers: Decimal::ZERO,
            net_amount: Decimal::ZERO,
            completed_count: 0,
            failed_count: 0,
        };

        for tx in &history {
            match tx.status {
                TransactionStatus::Completed => summary.completed_count += 1,
                TransactionStatus::Failed => {
                    summary.failed_count += 1;
                    continue;
                }
                TransactionStatus::Pending => continue,
            }

            match tx.transaction_type {
                TransactionType::Deposit => summary.total_deposits += tx.amount,
                TransactionType::Withdrawal => summary.total_withdrawals += tx.amount,
                TransactionType::Transfer => {
                    if tx.to_account_id == Some(account_id) {
                        summary.transfers_in += tx.amount;
                    }
                    if tx.from_account_id == Some(account_id) {
                        summary.transfers_out += tx.amount;
                    }
                }
            }
        }

        summary.net_transfers = summary.transfers_in - summary.transfers_out;
        summary.net_amount = summary.total_deposits - summary.total_withdrawals + summary.net_transfers;
        Ok(summary)
    }

    /// Checks `balance == opening balance + completed credits - completed debits`.
    pub async fn reconcile(&self, account_id: Uuid) -> Result<ReconciliationReport> {
        let account = self.accounts.get(account_id).await?;
        let history = self.transactions.list_by_account(account_id).await?;

        let mut completed_credits = Decimal::ZERO;
        let mut completed_debits = Decimal::ZERO;
        for tx in history.iter().filter(|tx| tx.status == TransactionStatus::Completed) {
            if tx.to_account_id == Some(account_id) {
                completed_credits += tx.amount;
            }
            if tx.from_account_id == Some(account_id) {
                completed_debits += tx.amount;
            }
        }

        let expected_balance = account.opening_balance + completed_credits - completed_debits;
        let balanced = expected_balance == account.balance;
        if !balanced {
            tracing::warn!(
                account_id = %account_id,
                expected = %expected_balance,
                actual = %account.balance,
                "Ledger does not reconcile with stored balance"
            );
        }

        Ok(ReconciliationReport {
            account_id,
            opening_balance: account.opening_balance,
            completed_credits,
            completed_debits,
            expected_balance,
            actual_balance: account.balance,
            balanced,
        })
    }
}
