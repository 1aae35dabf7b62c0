use crate::config::LedgerSettings;
use crate::error::{AppError, Result};
use crate::models::{check_amount_range, Account, AccountType};
use crate::observability::{get_metrics, mask_account_number};
use crate::services::ledger_engine::{LedgerEngine, LedgerReceipt, LedgerRequest};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Description of deposits made by `fund_all_accounts`.
pub const DEMO_FUNDING_DESCRIPTION: &str = "Demo money deposit";

/// Optional parts of a deposit or withdrawal request.
#[derive(Debug, Clone, Default)]
pub struct MovementOptions {
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

impl MovementOptions {
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            idempotency_key: None,
        }
    }
}

/// Account lifecycle: creation, lookup, deposits and withdrawals.
#[derive(Clone)]
pub struct AccountService {
    engine: LedgerEngine,
    opening_balance: Decimal,
    default_account_type: AccountType,
}

impl AccountService {
    pub fn new(engine: LedgerEngine, opening_balance: Decimal, default_account_type: AccountType) -> Self {
        Self {
            engine,
            opening_balance,
            default_account_type,
        }
    }

    pub fn from_settings(engine: LedgerEngine, settings: &LedgerSettings) -> Result<Self> {
        Ok(Self::new(
            engine,
            settings.opening_balance,
            settings.default_account_type()?,
        ))
    }

    pub fn default_account_type(&self) -> AccountType {
        self.default_account_type
    }

    /// Opens an account funded with the configured demo amount.
    pub async fn create_account(
        &self,
        owner_id: &str,
        account_type: Option<AccountType>,
    ) -> Result<Account> {
        self.create_account_with_balance(
            owner_id,
            account_type.unwrap_or(self.default_account_type),
            self.opening_balance,
        )
        .await
    }

    pub async fn create_account_with_balance(
        &self,
        owner_id: &str,
        account_type: AccountType,
        opening_balance: Decimal,
    ) -> Result<Account> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(AppError::Validation("Owner ID cannot be empty".to_string()));
        }
        if opening_balance < Decimal::ZERO {
            return Err(AppError::InvalidAmount(format!(
                "opening balance cannot be negative, got {}",
                opening_balance
            )));
        }
        check_amount_range(opening_balance)?;

        let account = self
            .engine
            .accounts()
            .create(owner_id, account_type, opening_balance)
            .await?;

        get_metrics().record_account_created(account.account_type.as_str());
        tracing::info!(
            account_id = %account.id,
            account_number = %mask_account_number(&account.account_number),
            account_type = account.account_type.as_str(),
            opening_balance = %account.opening_balance,
            "Account created"
        );

        Ok(account)
    }

    pub async fn get_account(&self, account_id: Uuid) -> Result<Account> {
        self.engine.accounts().get(account_id).await
    }

    pub async fn get_by_number(&self, account_number: &str) -> Result<Account> {
        self.engine.accounts().find_by_number(account_number.trim()).await
    }

    /// An owner's accounts in creation order; empty if there are none.
    pub async fn list_accounts(&self, owner_id: &str) -> Result<Vec<Account>> {
        self.engine.accounts().list_by_owner(owner_id).await
    }

    /// Advisory only: whether a withdrawal of `amount` would succeed right now.
    /// The engine re-checks atomically when the debit is applied.
    pub async fn can_withdraw(&self, account_id: Uuid, amount: Decimal) -> Result<bool> {
        let account = self.get_account(account_id).await?;
        Ok(account.can_cover(amount))
    }

    pub async fn deposit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        options: MovementOptions,
    ) -> Result<Account> {
        let request = Self::build(LedgerRequest::deposit(account_id, amount), options);
        let receipt = self.engine.execute(request).await?;
        self.account_after(account_id, receipt.to_balance).await
    }

    pub async fn withdraw(
        &self,
        account_id: Uuid,
        amount: Decimal,
        options: MovementOptions,
    ) -> Result<Account> {
        let request = Self::build(LedgerRequest::withdrawal(account_id, amount), options);
        let receipt = self.engine.execute(request).await?;
        self.account_after(account_id, receipt.from_balance).await
    }

    /// Deposits `amount` into every account the owner holds, one independent
    /// operation per account.
    pub async fn fund_all_accounts(&self, owner_id: &str, amount: Decimal) -> Result<Vec<Account>> {
        let accounts = self.list_accounts(owner_id).await?;
        if accounts.is_empty() {
            return Err(AppError::NotFound(format!(
                "Owner '{}' has no accounts",
                owner_id
            )));
        }

        let mut funded = Vec::with_capacity(accounts.len());
        for account in accounts {
            let receipt: LedgerReceipt = self
                .engine
                .deposit(account.id, amount, Some(DEMO_FUNDING_DESCRIPTION.to_string()))
                .await?;
            funded.push(Account {
                balance: receipt.to_balance.unwrap_or(account.balance),
                ..account
            });
        }

        tracing::info!(owner_id, accounts = funded.len(), amount = %amount, "Owner accounts funded");
        Ok(funded)
    }

    fn build(mut request: LedgerRequest, options: MovementOptions) -> LedgerRequest {
        request.description = options.description;
        request.idempotency_key = options.idempotency_key;
        request
    }

    /// The account as this operation left it.
    async fn account_after(&self, account_id: Uuid, balance: Option<Decimal>) -> Result<Account> {
        let mut account = self.get_account(account_id).await?;
        if let Some(balance) = balance {
            account.balance = balance;
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{InMemoryAccountStore, InMemoryTransactionLog};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn service() -> AccountService {
        let engine = LedgerEngine::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(InMemoryTransactionLog::new()),
        );
        AccountService::new(engine, dec!(5000.00), AccountType::Savings)
    }

    #[tokio::test]
    async fn test_create_account_uses_defaults() {
        let service = service();
        let account = service.create_account("owner-1", None).await.unwrap();

        assert_eq!(account.balance, dec!(5000.00));
        assert_eq!(account.opening_balance, dec!(5000.00));
        assert_eq!(account.account_type, AccountType::Savings);
        assert!(account.account_number.starts_with("ACC"));
        assert_eq!(account.account_number.len(), 13);
    }

    #[tokio::test]
    async fn test_create_account_validation() {
        let service = service();

        let err = service.create_account("   ", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .create_account_with_balance("owner-1", AccountType::Checking, dec!(-0.01))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));

        let err = service
            .create_account_with_balance("owner-1", AccountType::Checking, dec!(10.00001))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_lookup_by_number() {
        let service = service();
        let account = service
            .create_account("owner-1", Some(AccountType::Checking))
            .await
            .unwrap();

        let found = service.get_by_number(&account.account_number).await.unwrap();
        assert_eq!(found.id, account.id);
    }

    #[tokio::test]
    async fn test_deposit_and_withdraw_return_updated_account() {
        let service = service();
        let account = service.create_account("owner-1", None).await.unwrap();

        let after_deposit = service
            .deposit(account.id, dec!(250.25), MovementOptions::default())
            .await
            .unwrap();
        assert_eq!(after_deposit.balance, dec!(5250.25));

        let after_withdrawal = service
            .withdraw(account.id, dec!(0.25), MovementOptions::described("ATM"))
            .await
            .unwrap();
        assert_eq!(after_withdrawal.balance, dec!(5250.00));
    }

    #[tokio::test]
    async fn test_can_withdraw_is_advisory() {
        let service = service();
        let account = service
            .create_account_with_balance("owner-1", AccountType::Savings, dec!(50))
            .await
            .unwrap();

        assert!(service.can_withdraw(account.id, dec!(50)).await.unwrap());
        assert!(!service.can_withdraw(account.id, dec!(50.01)).await.unwrap());
    }

    #[tokio::test]
    async fn test_fund_all_accounts() {
        let service = service();
        service.create_account("owner-1", None).await.unwrap();
        service
            .create_account_with_balance("owner-1", AccountType::Checking, dec!(0))
            .await
            .unwrap();

        let funded = service.fund_all_accounts("owner-1", dec!(100)).await.unwrap();
        let balances: Vec<Decimal> = funded.iter().map(|a| a.balance).collect();
        assert_eq!(balances, vec![dec!(5100.00), dec!(100)]);

        let err = service.fund_all_accounts("nobody", dec!(100)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
