use crate::error::{AppError, Result};
use crate::models::{
    Account, AccountNumberGenerator, AccountType, RandomAccountNumbers, TransactionType,
};
use crate::observability::{get_metrics, mask_account_number};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Default number of account-number candidates tried before giving up.
pub const DEFAULT_NUMBER_ATTEMPTS: u32 = 16;

/// Keyed storage of accounts; the single source of truth for balances.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetches an account by id.
    async fn get(&self, account_id: Uuid) -> Result<Account>;

    /// Fetches an account by its externally visible number.
    async fn find_by_number(&self, account_number: &str) -> Result<Account>;

    /// Lists an owner's accounts in insertion order.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Account>>;

    /// Inserts a fully formed account.
    /// Fails with `DuplicateAccountNumber` if the number is taken.
    async fn insert(&self, account: Account) -> Result<Account>;

    /// Adds `delta` (possibly negative) to the balance and returns the new balance.
    ///
    /// Indivisible with respect to concurrent callers on the same account.
    /// Fails with `InsufficientFunds` if the result would be negative.
    async fn apply_delta(&self, account_id: Uuid, delta: Decimal) -> Result<Decimal>;

    /// Debits `from_account_id` and credits `to_account_id` by `amount` as one
    /// unit and returns both new balances. Either both move or neither does.
    ///
    /// The default runs the two deltas in turn and undoes the debit when the
    /// credit fails. Stores with real transactions override it.
    async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal)> {
        let from_balance = self.apply_delta(from_account_id, -amount).await?;

        let credit_error = match self.apply_delta(to_account_id, amount).await {
            Ok(to_balance) => return Ok((from_balance, to_balance)),
            Err(e) => e,
        };

        get_metrics().record_rollback(TransactionType::Transfer.as_str());
        match self.apply_delta(from_account_id, amount).await {
            Ok(balance) => {
                tracing::warn!(
                    account_id = %from_account_id,
                    amount = %amount,
                    balance = %balance,
                    cause = %credit_error,
                    "Transfer credit failed, debit rolled back"
                );
                Err(credit_error)
            }
            Err(e) => {
                tracing::error!(
                    account_id = %from_account_id,
                    amount = %amount,
                    cause = %credit_error,
                    error = %e,
                    "Transfer credit failed and debit rollback failed"
                );
                Err(AppError::Internal(anyhow::anyhow!(
                    "rollback of debit on account '{}' failed: {}",
                    from_account_id,
                    e
                )))
            }
        }
    }

    /// Generator used by `create` for candidate account numbers.
    fn account_numbers(&self) -> &dyn AccountNumberGenerator;

    fn number_attempts(&self) -> u32 {
        DEFAULT_NUMBER_ATTEMPTS
    }

    /// Creates an account with a freshly generated unique number,
    /// retrying transparently on generator collisions.
    async fn create(
        &self,
        owner_id: &str,
        account_type: AccountType,
        opening_balance: Decimal,
    ) -> Result<Account> {
        let attempts = self.number_attempts().max(1);
        for attempt in 1..=attempts {
            let candidate = self.account_numbers().generate();
            let account = Account::new(
                owner_id.to_string(),
                candidate,
                account_type,
                opening_balance,
            );
            match self.insert(account).await {
                Err(AppError::DuplicateAccountNumber(number)) => {
                    tracing::debug!(
                        attempt,
                        account_number = %mask_account_number(&number),
                        "Account number collision, retrying"
                    );
                }
                other => return other,
            }
        }

        Err(AppError::DuplicateAccountNumber(format!(
            "no unique account number after {} attempts",
            attempts
        )))
    }

    /// Checks that the backing storage is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct AccountIndex {
    accounts: HashMap<Uuid, Arc<Mutex<Account>>>,
    by_number: HashMap<String, Uuid>,
    by_owner: HashMap<String, Vec<Uuid>>,
}

/// Process-local account store with one mutex per account.
pub struct InMemoryAccountStore {
    index: RwLock<AccountIndex>,
    numbers: Arc<dyn AccountNumberGenerator>,
    number_attempts: u32,
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::with_generator(Arc::new(RandomAccountNumbers), DEFAULT_NUMBER_ATTEMPTS)
    }

    pub fn with_generator(numbers: Arc<dyn AccountNumberGenerator>, number_attempts: u32) -> Self {
        Self {
            index: RwLock::new(AccountIndex::default()),
            numbers,
            number_attempts,
        }
    }

    async fn slot(&self, account_id: Uuid) -> Result<Arc<Mutex<Account>>> {
        self.index
            .read()
            .await
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Account '{}' not found", account_id)))
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, account_id: Uuid) -> Result<Account> {
        let slot = self.slot(account_id).await?;
        let account = slot.lock().await.clone();
        Ok(account)
    }

    async fn find_by_number(&self, account_number: &str) -> Result<Account> {
        let id = self
            .index
            .read()
            .await
            .by_number
            .get(account_number)
            .copied()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Account with number '{}' not found",
                    account_number
                ))
            })?;
        self.get(id).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Account>> {
        let slots: Vec<Arc<Mutex<Account>>> = {
            let index = self.index.read().await;
            index
                .by_owner
                .get(owner_id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| index.accounts.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut accounts = Vec::with_capacity(slots.len());
        for slot in slots {
            accounts.push(slot.lock().await.clone());
        }
        Ok(accounts)
    }

    async fn insert(&self, account: Account) -> Result<Account> {
        let mut index = self.index.write().await;
        if index.by_number.contains_key(&account.account_number) {
            return Err(AppError::DuplicateAccountNumber(account.account_number));
        }
        if index.accounts.contains_key(&account.id) {
            return Err(AppError::Internal(anyhow::anyhow!(
                "account id '{}' already exists",
                account.id
            )));
        }

        index
            .by_number
            .insert(account.account_number.clone(), account.id);
        index
            .by_owner
            .entry(account.owner_id.clone())
            .or_default()
            .push(account.id);
        index
            .accounts
            .insert(account.id, Arc::new(Mutex::new(account.clone())));

        Ok(account)
    }

    async fn apply_delta(&self, account_id: Uuid, delta: Decimal) -> Result<Decimal> {
        let slot = self.slot(account_id).await?;
        let mut account = slot.lock().await;
        account.apply_delta(delta)
    }

    fn account_numbers(&self) -> &dyn AccountNumberGenerator {
        self.numbers.as_ref()
    }

    fn number_attempts(&self) -> u32 {
        self.number_attempts
    }
}
