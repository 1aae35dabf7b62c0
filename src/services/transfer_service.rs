use crate::error::Result;
use crate::models::{Transaction, TransactionType};
use crate::services::ledger_engine::{LedgerEngine, LedgerRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const INTERNAL_TRANSFER_SUFFIX: &str = " (Internal Transfer)";

/// How a caller names the destination of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountIdentifier {
    AccountId(Uuid),
    AccountNumber(String),
}

/// A transfer as received from a caller, before destination resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_account_id: Uuid,
    pub to: AccountIdentifier,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Resolves transfer destinations to internal ids and hands the transfer to the engine.
#[derive(Clone)]
pub struct TransferService {
    engine: LedgerEngine,
}

impl TransferService {
    pub fn new(engine: LedgerEngine) -> Self {
        Self { engine }
    }

    /// Internal id of the destination account.
    pub async fn resolve(&self, identifier: &AccountIdentifier) -> Result<Uuid> {
        match identifier {
            AccountIdentifier::AccountId(id) => Ok(*id),
            AccountIdentifier::AccountNumber(number) => {
                let account = self.engine.accounts().find_by_number(number.trim()).await?;
                Ok(account.id)
            }
        }
    }

    /// Moves money between two accounts and returns the COMPLETED record.
    pub async fn transfer(&self, command: TransferCommand) -> Result<Transaction> {
        let to_account_id = self.resolve(&command.to).await?;
        let description = self
            .describe(command.from_account_id, to_account_id, command.description)
            .await;

        let mut request = LedgerRequest::transfer(command.from_account_id, to_account_id, command.amount)
            .with_description(description);
        request.idempotency_key = command.idempotency_key;

        let receipt = self.engine.execute(request).await?;
        Ok(receipt.transaction)
    }

    /// Caller's description, or the default, marked when both accounts share an owner.
    async fn describe(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        description: Option<String>,
    ) -> String {
        let mut description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| TransactionType::Transfer.default_description().to_string());

        // Same-account and unknown-account cases are left to the engine's validation.
        if from_account_id == to_account_id {
            return description;
        }
        let accounts = self.engine.accounts();
        let (from, to) = match (accounts.get(from_account_id).await, accounts.get(to_account_id).await) {
            (Ok(from), Ok(to)) => (from, to),
            _ => return description,
        };

        if from.owner_id == to.owner_id && !description.ends_with(INTERNAL_TRANSFER_SUFFIX) {
            description.push_str(INTERNAL_TRANSFER_SUFFIX);
        }
        description
    }
}
