use crate::error::{AppError, Result};
use crate::idempotency::{
    IdempotencyAttributes, IdempotencyCheckResult, IdempotencyHandler, IdempotencyHandlerConfig,
    IdempotencyMetrics, StoredOutcome,
};
use crate::models::{
    check_amount_range, NewTransaction, Transaction, TransactionStatus, TransactionType,
};
use crate::observability::{get_metrics, LatencyTimer};
use crate::repositories::{AccountStore, TransactionLog};
use crate::services::locks::AccountLocks;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Lifecycle of a single ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    Requested,
    Validating,
    Rejected,
    Applying,
    Applied,
    RolledBack,
    Completed,
    Failed,
}

impl OperationState {
    /// Returns valid next states from the current state.
    pub fn valid_transitions(&self) -> &'static [OperationState] {
        match self {
            OperationState::Requested => &[OperationState::Validating],
            OperationState::Validating => &[OperationState::Rejected, OperationState::Applying],
            OperationState::Applying => &[OperationState::Applied, OperationState::RolledBack],
            // A completed mutation is compensated if its record cannot be finalized.
            OperationState::Applied => &[OperationState::Completed, OperationState::RolledBack],
            OperationState::RolledBack => &[OperationState::Failed],
            OperationState::Rejected | OperationState::Completed | OperationState::Failed => &[],
        }
    }

    pub fn can_transition(&self, next: OperationState) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// Moves to `next`, or fails with `InvalidStateTransition`.
    pub fn advance(&mut self, next: OperationState) -> Result<()> {
        if !self.can_transition(next) {
            tracing::error!(from = ?self, to = ?next, "Invalid ledger operation transition");
            return Err(AppError::InvalidStateTransition(format!(
                "ledger operation cannot move from {:?} to {:?}",
                self, next
            )));
        }
        *self = next;
        Ok(())
    }
}

/// Which balance movement a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Deposit { account_id: Uuid },
    Withdrawal { account_id: Uuid },
    Transfer { from_account_id: Uuid, to_account_id: Uuid },
}

impl Operation {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Operation::Deposit { .. } => TransactionType::Deposit,
            Operation::Withdrawal { .. } => TransactionType::Withdrawal,
            Operation::Transfer { .. } => TransactionType::Transfer,
        }
    }

    /// Account debited, if any.
    pub fn source(&self) -> Option<Uuid> {
        match *self {
            Operation::Deposit { .. } => None,
            Operation::Withdrawal { account_id } => Some(account_id),
            Operation::Transfer { from_account_id, .. } => Some(from_account_id),
        }
    }

    /// Account credited, if any.
    pub fn destination(&self) -> Option<Uuid> {
        match *self {
            Operation::Deposit { account_id } => Some(account_id),
            Operation::Withdrawal { .. } => None,
            Operation::Transfer { to_account_id, .. } => Some(to_account_id),
        }
    }

    pub fn account_ids(&self) -> Vec<Uuid> {
        self.source().into_iter().chain(self.destination()).collect()
    }
}

/// A deposit, withdrawal or transfer submitted to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRequest {
    pub operation: Operation,
    pub amount: Decimal,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

impl LedgerRequest {
    pub fn deposit(account_id: Uuid, amount: Decimal) -> Self {
        Self::new(Operation::Deposit { account_id }, amount)
    }

    pub fn withdrawal(account_id: Uuid, amount: Decimal) -> Self {
        Self::new(Operation::Withdrawal { account_id }, amount)
    }

    pub fn transfer(from_account_id: Uuid, to_account_id: Uuid, amount: Decimal) -> Self {
        Self::new(
            Operation::Transfer {
                from_account_id,
                to_account_id,
            },
            amount,
        )
    }

    fn new(operation: Operation, amount: Decimal) -> Self {
        Self {
            operation,
            amount,
            description: None,
            idempotency_key: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    fn to_new_transaction(&self) -> NewTransaction {
        let description = self.description.clone();
        match self.operation {
            Operation::Deposit { account_id } => {
                NewTransaction::deposit(account_id, self.amount, description)
            }
            Operation::Withdrawal { account_id } => {
                NewTransaction::withdrawal(account_id, self.amount, description)
            }
            Operation::Transfer {
                from_account_id,
                to_account_id,
            } => NewTransaction::transfer(from_account_id, to_account_id, self.amount, description),
        }
    }

    fn fingerprint_attributes(&self) -> IdempotencyAttributes {
        let mut attributes =
            IdempotencyAttributes::new(self.operation.transaction_type().as_str()).with_amount(self.amount);
        if let Some(source) = self.operation.source() {
            attributes = attributes.with_source_account(source);
        }
        if let Some(destination) = self.operation.destination() {
            attributes = attributes.with_destination_account(destination);
        }
        if let Some(ref description) = self.description {
            attributes = attributes.with_description(description.trim());
        }
        attributes
    }
}

/// Outcome of a completed ledger operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    /// The COMPLETED record.
    pub transaction: Transaction,
    /// Balance of the debited account right after the operation.
    pub from_balance: Option<Decimal>,
    /// Balance of the credited account right after the operation.
    pub to_balance: Option<Decimal>,
}

/// Applies deposits, withdrawals and transfers as atomic units against the
/// account store and transaction log.
///
/// Each operation runs validate, log PENDING, mutate, finalize. Validation
/// failures never touch the log. Once a record is appended the operation
/// always ends with exactly one terminal status, and the apply phase runs on
/// its own task so an abandoned caller cannot interrupt it.
#[derive(Clone)]
pub struct LedgerEngine {
    accounts: Arc<dyn AccountStore>,
    transactions: Arc<dyn TransactionLog>,
    locks: Arc<AccountLocks>,
    idempotency: Arc<IdempotencyHandler<LedgerReceipt>>,
    lock_timeout: Duration,
}

impl LedgerEngine {
    pub fn new(accounts: Arc<dyn AccountStore>, transactions: Arc<dyn TransactionLog>) -> Self {
        Self {
            accounts,
            transactions,
            locks: Arc::new(AccountLocks::new()),
            idempotency: Arc::new(IdempotencyHandler::new(IdempotencyHandlerConfig::default())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.idempotency = Arc::new(IdempotencyHandler::new(IdempotencyHandlerConfig::with_ttl(ttl)));
        self
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    pub fn transactions(&self) -> &Arc<dyn TransactionLog> {
        &self.transactions
    }

    pub fn idempotency(&self) -> &Arc<IdempotencyHandler<LedgerReceipt>> {
        &self.idempotency
    }

    pub fn idempotency_metrics(&self) -> Arc<IdempotencyMetrics> {
        self.idempotency.metrics()
    }

    pub async fn deposit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<LedgerReceipt> {
        let mut request = LedgerRequest::deposit(account_id, amount);
        request.description = description;
        self.execute(request).await
    }

    pub async fn withdraw(
        &self,
        account_id: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<LedgerReceipt> {
        let mut request = LedgerRequest::withdrawal(account_id, amount);
        request.description = description;
        self.execute(request).await
    }

    pub async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<LedgerReceipt> {
        let mut request = LedgerRequest::transfer(from_account_id, to_account_id, amount);
        request.description = description;
        self.execute(request).await
    }

    /// Runs one ledger operation to a terminal state.
    pub async fn execute(&self, request: LedgerRequest) -> Result<LedgerReceipt> {
        let timer = LatencyTimer::new();
        let operation_type = request.operation.transaction_type();

        let claimed_key = match request.idempotency_key.as_deref() {
            Some(client_key) => {
                let key = self.idempotency.normalize_client_key(client_key);
                let hash = self.idempotency.hash_request(&request.fingerprint_attributes());
                match self.idempotency.check(&key, operation_type.as_str(), &hash).await? {
                    IdempotencyCheckResult::New => Some(key),
                    IdempotencyCheckResult::Duplicate(outcome) => {
                        get_metrics().record_idempotent_replay(operation_type.as_str());
                        tracing::info!(
                            operation = operation_type.as_str(),
                            "Replaying stored outcome for idempotency key"
                        );
                        return match outcome {
                            StoredOutcome::Completed(receipt) => Ok(receipt),
                            StoredOutcome::Failed { kind, message } => {
                                Err(AppError::from_kind(kind, message))
                            }
                        };
                    }
                }
            }
            None => None,
        };

        let mut state = OperationState::Requested;
        state.advance(OperationState::Validating)?;

        if let Err(e) = self.validate(&request).await {
            state.advance(OperationState::Rejected)?;
            if let Some(key) = claimed_key {
                self.idempotency.release(&key).await;
            }
            get_metrics().record_rejection(operation_type.as_str(), e.kind().as_str());
            tracing::warn!(
                operation = operation_type.as_str(),
                amount = %request.amount,
                error = %e,
                "Ledger operation rejected"
            );
            return Err(e);
        }

        let appended = Arc::new(OnceLock::<i64>::new());
        let engine = self.clone();
        let task_key = claimed_key.clone();
        let task_appended = Arc::clone(&appended);
        let task = tokio::spawn(async move {
            let outcome = engine.apply(&request, &mut state, &task_appended).await;
            engine.settle_idempotency(task_key, &outcome, state).await;
            outcome
        });

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                self.recover_aborted(appended.get().copied(), claimed_key).await;
                Err(AppError::Internal(anyhow::anyhow!(
                    "ledger task aborted: {}",
                    join_error
                )))
            }
        };

        let label = if outcome.is_ok() { "completed" } else { "failed" };
        get_metrics().record_operation(operation_type.as_str(), label, timer.elapsed_ms());
        outcome
    }

    async fn validate(&self, request: &LedgerRequest) -> Result<()> {
        if let Operation::Transfer {
            from_account_id,
            to_account_id,
        } = request.operation
        {
            if from_account_id == to_account_id {
                return Err(AppError::SameAccountTransfer(format!(
                    "cannot transfer from account '{}' to itself",
                    from_account_id
                )));
            }
        }

        if request.amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }
        check_amount_range(request.amount)?;

        for account_id in request.operation.account_ids() {
            self.accounts.get(account_id).await?;
        }

        Ok(())
    }

    async fn apply(
        &self,
        request: &LedgerRequest,
        state: &mut OperationState,
        appended: &OnceLock<i64>,
    ) -> Result<LedgerReceipt> {
        state.advance(OperationState::Applying)?;

        let _guard = self
            .locks
            .acquire(&request.operation.account_ids(), self.lock_timeout)
            .await?;

        let pending = self.transactions.append(request.to_new_transaction()).await?;
        let _ = appended.set(pending.id);
        tracing::debug!(
            transaction_id = pending.id,
            transaction_type = pending.transaction_type.as_str(),
            amount = %pending.amount,
            "Ledger record appended"
        );

        let (from_balance, to_balance) = match self.mutate(request).await {
            Ok(balances) => balances,
            Err(e) => {
                state.advance(OperationState::RolledBack)?;
                self.finalize_failed(pending.id, state).await?;
                tracing::info!(
                    transaction_id = pending.id,
                    error = %e,
                    "Ledger operation failed"
                );
                return Err(e);
            }
        };
        state.advance(OperationState::Applied)?;

        match self
            .transactions
            .finalize(pending.id, TransactionStatus::Completed)
            .await
        {
            Ok(transaction) => {
                state.advance(OperationState::Completed)?;
                tracing::info!(
                    transaction_id = transaction.id,
                    transaction_type = transaction.transaction_type.as_str(),
                    from_account_id = ?transaction.from_account_id,
                    to_account_id = ?transaction.to_account_id,
                    amount = %transaction.amount,
                    "Ledger operation completed"
                );
                Ok(LedgerReceipt {
                    transaction,
                    from_balance,
                    to_balance,
                })
            }
            Err(e) => {
                tracing::error!(
                    transaction_id = pending.id,
                    error = %e,
                    "Could not complete ledger record, reverting balances"
                );
                self.revert(request).await?;
                get_metrics().record_rollback(request.operation.transaction_type().as_str());
                state.advance(OperationState::RolledBack)?;
                self.finalize_failed(pending.id, state).await?;
                Err(e)
            }
        }
    }

    /// Applies the balance deltas. A transfer moves both balances or neither.
    async fn mutate(&self, request: &LedgerRequest) -> Result<(Option<Decimal>, Option<Decimal>)> {
        let amount = request.amount;
        match request.operation {
            Operation::Deposit { account_id } => {
                let balance = self.accounts.apply_delta(account_id, amount).await?;
                Ok((None, Some(balance)))
            }
            Operation::Withdrawal { account_id } => {
                let balance = self.accounts.apply_delta(account_id, -amount).await?;
                Ok((Some(balance), None))
            }
            Operation::Transfer {
                from_account_id,
                to_account_id,
            } => {
                let (from_balance, to_balance) = self
                    .accounts
                    .transfer(from_account_id, to_account_id, amount)
                    .await?;
                Ok((Some(from_balance), Some(to_balance)))
            }
        }
    }

    /// Inverse of `mutate`, used when a completed mutation cannot be recorded.
    async fn revert(&self, request: &LedgerRequest) -> Result<()> {
        let amount = request.amount;
        match request.operation {
            Operation::Deposit { account_id } => {
                self.accounts.apply_delta(account_id, -amount).await?;
            }
            Operation::Withdrawal { account_id } => {
                self.accounts.apply_delta(account_id, amount).await?;
            }
            Operation::Transfer {
                from_account_id,
                to_account_id,
            } => {
                self.accounts
                    .transfer(to_account_id, from_account_id, amount)
                    .await?;
            }
        }
        Ok(())
    }

    /// Marks the record FAILED. If that write fails the state stays
    /// `RolledBack`, so no failed outcome is stored for the key.
    async fn finalize_failed(&self, transaction_id: i64, state: &mut OperationState) -> Result<()> {
        if let Err(e) = self
            .transactions
            .finalize(transaction_id, TransactionStatus::Failed)
            .await
        {
            tracing::error!(
                transaction_id,
                error = %e,
                "Could not mark ledger record FAILED"
            );
            return Err(e);
        }
        state.advance(OperationState::Failed)
    }

    /// Cleans up after an apply task that died before settling: its record,
    /// if one was appended, is marked FAILED and the key is freed for a retry.
    async fn recover_aborted(&self, transaction_id: Option<i64>, claimed_key: Option<String>) {
        if let Some(transaction_id) = transaction_id {
            match self
                .transactions
                .finalize(transaction_id, TransactionStatus::Failed)
                .await
            {
                Ok(_) | Err(AppError::InvalidStateTransition(_)) => {}
                Err(e) => tracing::error!(
                    transaction_id,
                    error = %e,
                    "Could not mark aborted ledger record FAILED"
                ),
            }
        }
        if let Some(key) = claimed_key {
            self.idempotency.release(&key).await;
        }
        tracing::error!(transaction_id = ?transaction_id, "Ledger apply task aborted");
    }

    /// Records the outcome against the claimed key. Keys for operations that
    /// never reached a terminal record are released so the client can retry.
    async fn settle_idempotency(
        &self,
        claimed_key: Option<String>,
        outcome: &Result<LedgerReceipt>,
        state: OperationState,
    ) {
        let Some(key) = claimed_key else {
            return;
        };

        match outcome {
            Ok(receipt) => self.idempotency.complete(&key, receipt.clone()).await,
            Err(e) if state.is_terminal() => {
                self.idempotency.fail(&key, e.kind(), e.detail()).await
            }
            Err(_) => self.idempotency.release(&key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountType;
    use crate::repositories::{InMemoryAccountStore, InMemoryTransactionLog};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn engine_with_accounts(balances: &[Decimal]) -> (LedgerEngine, Vec<Uuid>) {
        let store = Arc::new(InMemoryAccountStore::new());
        let mut ids = Vec::new();
        for balance in balances {
            let account = store
                .create("owner-1", AccountType::Savings, *balance)
                .await
                .unwrap();
            ids.push(account.id);
        }
        let engine = LedgerEngine::new(store, Arc::new(InMemoryTransactionLog::new()));
        (engine, ids)
    }

    #[test]
    fn test_operation_state_transitions() {
        use OperationState::*;

        assert!(Requested.can_transition(Validating));
        assert!(Validating.can_transition(Rejected));
        assert!(Validating.can_transition(Applying));
        assert!(Applying.can_transition(Applied));
        assert!(Applying.can_transition(RolledBack));
        assert!(Applied.can_transition(Completed));
        assert!(RolledBack.can_transition(Failed));

        assert!(!Requested.can_transition(Applying));
        assert!(!Rejected.can_transition(Validating));
        assert!(!Completed.can_transition(Failed));
        assert!(!Failed.can_transition(Validating));
        assert!(!Applying.can_transition(Validating));

        assert!(Rejected.is_terminal());
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Applied.is_terminal());
    }

    #[test]
    fn test_advance_rejects_invalid_transition() {
        let mut state = OperationState::Completed;
        let err = state.advance(OperationState::Validating).unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));
        assert_eq!(state, OperationState::Completed);
    }

    #[test]
    fn test_operation_accounts() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let transfer = Operation::Transfer {
            from_account_id: a,
            to_account_id: b,
        };
        assert_eq!(transfer.account_ids(), vec![a, b]);
        assert_eq!(transfer.source(), Some(a));
        assert_eq!(transfer.destination(), Some(b));

        assert_eq!(Operation::Deposit { account_id: a }.account_ids(), vec![a]);
        assert_eq!(Operation::Withdrawal { account_id: a }.source(), Some(a));
        assert_eq!(Operation::Withdrawal { account_id: a }.destination(), None);
    }

    #[tokio::test]
    async fn test_deposit_receipt() {
        let (engine, ids) = engine_with_accounts(&[dec!(100)]).await;

        let receipt = engine.deposit(ids[0], dec!(25.50), None).await.unwrap();

        assert_eq!(receipt.transaction.status, TransactionStatus::Completed);
        assert_eq!(receipt.transaction.transaction_type, TransactionType::Deposit);
        assert_eq!(receipt.transaction.description, "Cash deposit");
        assert_eq!(receipt.to_balance, Some(dec!(125.50)));
        assert_eq!(receipt.from_balance, None);
    }

    #[tokio::test]
    async fn test_transfer_rejects_same_account_before_amount() {
        let (engine, ids) = engine_with_accounts(&[dec!(100)]).await;

        let err = engine.transfer(ids[0], ids[0], dec!(-1), None).await.unwrap_err();
        assert!(matches!(err, AppError::SameAccountTransfer(_)));
    }

    #[tokio::test]
    async fn test_unknown_account_is_rejected_without_record() {
        let (engine, _) = engine_with_accounts(&[]).await;

        let err = engine
            .withdraw(Uuid::new_v4(), dec!(10), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(engine.transactions().list_recent(10).await.unwrap().is_empty());
    }

    /// Store whose first balance update panics mid-operation.
    struct PanicOnceStore {
        inner: InMemoryAccountStore,
        armed: AtomicBool,
    }

    #[async_trait::async_trait]
    impl AccountStore for PanicOnceStore {
        async fn get(&self, account_id: Uuid) -> Result<crate::models::Account> {
            self.inner.get(account_id).await
        }

        async fn find_by_number(&self, account_number: &str) -> Result<crate::models::Account> {
            self.inner.find_by_number(account_number).await
        }

        async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<crate::models::Account>> {
            self.inner.list_by_owner(owner_id).await
        }

        async fn insert(&self, account: crate::models::Account) -> Result<crate::models::Account> {
            self.inner.insert(account).await
        }

        async fn apply_delta(&self, account_id: Uuid, delta: Decimal) -> Result<Decimal> {
            if self.armed.swap(false, Ordering::SeqCst) {
                panic!("balance update crashed");
            }
            self.inner.apply_delta(account_id, delta).await
        }

        fn account_numbers(&self) -> &dyn crate::models::AccountNumberGenerator {
            self.inner.account_numbers()
        }
    }

    #[tokio::test]
    async fn test_out_of_range_amounts_are_rejected_without_record() {
        let (engine, ids) = engine_with_accounts(&[dec!(5000)]).await;

        let request = LedgerRequest::deposit(ids[0], Decimal::MAX).with_idempotency_key("big-1");
        let err = engine.execute(request).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));

        let err = engine.deposit(ids[0], dec!(0.00001), None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));

        assert!(engine.transactions().list_recent(10).await.unwrap().is_empty());
        assert_eq!(engine.accounts().get(ids[0]).await.unwrap().balance, dec!(5000));

        // The rejected key is free for a corrected request.
        let request = LedgerRequest::deposit(ids[0], dec!(10)).with_idempotency_key("big-1");
        let receipt = engine.execute(request).await.unwrap();
        assert_eq!(receipt.to_balance, Some(dec!(5010)));
    }

    #[tokio::test]
    async fn test_aborted_apply_fails_record_and_frees_key() {
        let store = Arc::new(PanicOnceStore {
            inner: InMemoryAccountStore::new(),
            armed: AtomicBool::new(true),
        });
        let account = store
            .inner
            .create("owner-1", AccountType::Savings, dec!(100))
            .await
            .unwrap();
        let engine = LedgerEngine::new(store, Arc::new(InMemoryTransactionLog::new()));

        let request = LedgerRequest::deposit(account.id, dec!(10)).with_idempotency_key("crash-1");
        let err = engine.execute(request.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let records = engine.transactions().list_recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TransactionStatus::Failed);

        let receipt = engine.execute(request).await.unwrap();
        assert_eq!(receipt.to_balance, Some(dec!(110)));
        assert_eq!(engine.accounts().get(account.id).await.unwrap().balance, dec!(110));
    }

    #[tokio::test]
    async fn test_replay_returns_original_receipt() {
        let (engine, ids) = engine_with_accounts(&[dec!(100)]).await;
        let request = LedgerRequest::withdrawal(ids[0], dec!(40)).with_idempotency_key("retry-1");

        let first = engine.execute(request.clone()).await.unwrap();
        let second = engine.execute(request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.accounts().get(ids[0]).await.unwrap().balance, dec!(60));
        assert_eq!(engine.transactions().list_recent(10).await.unwrap().len(), 1);
    }
}
