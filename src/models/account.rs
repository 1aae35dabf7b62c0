use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Fractional digits a stored amount may carry.
pub const AMOUNT_SCALE: u32 = 4;

/// Largest amount or balance the ledger stores, matching `NUMERIC(20, 4)`.
pub fn max_amount() -> Decimal {
    Decimal::from_i128_with_scale(99_999_999_999_999_999_999, AMOUNT_SCALE)
}

/// Rejects amounts the storage column cannot hold exactly.
pub fn check_amount_range(amount: Decimal) -> Result<()> {
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(AppError::InvalidAmount(format!(
            "amount {} has more than {} decimal places",
            amount, AMOUNT_SCALE
        )));
    }
    if amount.abs() > max_amount() {
        return Err(AppError::InvalidAmount(format!(
            "amount {} exceeds the maximum of {}",
            amount,
            max_amount()
        )));
    }
    Ok(())
}

/// Kind of customer account. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Checking,
    Savings,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "CHECKING",
            AccountType::Savings => "SAVINGS",
        }
    }
}

impl FromStr for AccountType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "CHECKING" => Ok(AccountType::Checking),
            "SAVINGS" => Ok(AccountType::Savings),
            other => Err(AppError::Validation(format!(
                "Unknown account type '{}'. Valid values: CHECKING, SAVINGS",
                other
            ))),
        }
    }
}

/// A balance-holding account owned by a user.
///
/// Everything except `balance` (and the `updated_at` stamp that follows it)
/// is immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub owner_id: String,
    pub account_number: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    /// Balance the account was opened with. Not a ledger record.
    pub opening_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        owner_id: String,
        account_number: String,
        account_type: AccountType,
        opening_balance: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            account_number,
            account_type,
            balance: opening_balance,
            opening_balance,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advisory check: would a debit of `amount` succeed right now?
    /// Only `apply_delta` under the store's lock is authoritative.
    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Applies a signed delta, refusing to go below zero or above `max_amount()`.
    /// Returns the new balance.
    pub fn apply_delta(&mut self, delta: Decimal) -> Result<Decimal> {
        let new_balance = self
            .balance
            .checked_add(delta)
            .filter(|balance| *balance <= max_amount())
            .ok_or_else(|| {
                AppError::InvalidAmount(format!(
                    "account '{}': balance {} cannot absorb {}",
                    self.id, self.balance, delta
                ))
            })?;
        if new_balance < Decimal::ZERO {
            return Err(AppError::InsufficientFunds(format!(
                "account '{}': requested {}, available {}",
                self.id,
                -delta,
                self.balance
            )));
        }
        self.balance = new_balance;
        self.updated_at = Utc::now();
        Ok(new_balance)
    }
}

/// Source of candidate account numbers.
///
/// Candidates are not guaranteed unique; stores retry on collision.
pub trait AccountNumberGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// `ACC` followed by ten random digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomAccountNumbers;

impl AccountNumberGenerator for RandomAccountNumbers {
    fn generate(&self) -> String {
        let digits = Uuid::new_v4().as_u128() % 10_000_000_000;
        format!("ACC{:010}", digits)
    }
}
