use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AccountType;
use crate::services::AccountIdentifier;

/// Header carrying the client's idempotency token on mutating requests.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Request to open a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub owner_id: String,
    #[serde(default)]
    pub account_type: Option<AccountType>,
    /// Defaults to the configured demo-funding amount.
    #[serde(default)]
    pub opening_balance: Option<Decimal>,
}

impl CreateAccountRequest {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.owner_id.trim().is_empty() {
            errors.push(ValidationError::new("owner_id", "owner_id cannot be empty"));
        }
        if let Some(balance) = self.opening_balance {
            if balance < Decimal::ZERO {
                errors.push(ValidationError::new(
                    "opening_balance",
                    "opening_balance cannot be negative",
                ));
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Body of a deposit or withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyMovementRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of a demo funding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundAccountsRequest {
    pub amount: Decimal,
}

/// Body of a transfer. `to` is `{"account_id": ...}` or `{"account_number": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: Uuid,
    pub to: AccountIdentifier,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

/// Query parameters for listing recent transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTransactionsQuery {
    pub limit: Option<usize>,
}

impl ListTransactionsQuery {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 500;

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT)
    }
}
