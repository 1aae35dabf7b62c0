use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors surfaced by the ledger and its facades.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Same account transfer: {0}")]
    SameAccountTransfer(String),

    #[error("Duplicate account number: {0}")]
    DuplicateAccountNumber(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Idempotency conflict: {0}")]
    IdempotencyConflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Stable, enumerable error kind exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidAmount,
    InsufficientFunds,
    SameAccountTransfer,
    DuplicateAccountNumber,
    InvalidStateTransition,
    ValidationError,
    IdempotencyConflict,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidAmount => "INVALID_AMOUNT",
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::SameAccountTransfer => "SAME_ACCOUNT_TRANSFER",
            ErrorKind::DuplicateAccountNumber => "DUPLICATE_ACCOUNT_NUMBER",
            ErrorKind::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    /// Returns the machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            AppError::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            AppError::SameAccountTransfer(_) => ErrorKind::SameAccountTransfer,
            AppError::DuplicateAccountNumber(_) => ErrorKind::DuplicateAccountNumber,
            AppError::InvalidStateTransition(_) => ErrorKind::InvalidStateTransition,
            AppError::Validation(_) => ErrorKind::ValidationError,
            AppError::IdempotencyConflict(_) => ErrorKind::IdempotencyConflict,
            AppError::Database(_) | AppError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Rebuilds an error from a recorded kind and message.
    /// Used when replaying the outcome of an already-processed request.
    pub fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::InvalidAmount => AppError::InvalidAmount(message),
            ErrorKind::InsufficientFunds => AppError::InsufficientFunds(message),
            ErrorKind::SameAccountTransfer => AppError::SameAccountTransfer(message),
            ErrorKind::DuplicateAccountNumber => AppError::DuplicateAccountNumber(message),
            ErrorKind::InvalidStateTransition => AppError::InvalidStateTransition(message),
            ErrorKind::ValidationError => AppError::Validation(message),
            ErrorKind::IdempotencyConflict => AppError::IdempotencyConflict(message),
            ErrorKind::InternalError => AppError::Internal(anyhow::anyhow!(message)),
        }
    }

    /// Message without the kind prefix added by `Display`.
    pub fn detail(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::InvalidAmount(msg)
            | AppError::InsufficientFunds(msg)
            | AppError::SameAccountTransfer(msg)
            | AppError::DuplicateAccountNumber(msg)
            | AppError::InvalidStateTransition(msg)
            | AppError::Validation(msg)
            | AppError::IdempotencyConflict(msg) => msg.clone(),
            AppError::Database(e) => e.to_string(),
            AppError::Internal(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AppError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            AppError::InsufficientFunds("x".into()).kind(),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).kind(),
            ErrorKind::InternalError
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).kind(),
            ErrorKind::InternalError
        );
    }

    #[test]
    fn test_from_kind_preserves_kind_and_message() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::InvalidAmount,
            ErrorKind::InsufficientFunds,
            ErrorKind::SameAccountTransfer,
            ErrorKind::IdempotencyConflict,
            ErrorKind::InternalError,
        ];
        for kind in kinds {
            let err = AppError::from_kind(kind, "original message".to_string());
            assert_eq!(err.kind(), kind);
            assert_eq!(err.detail(), "original message");
        }
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::SameAccountTransfer).unwrap();
        assert_eq!(json, "\"SAME_ACCOUNT_TRANSFER\"");
        assert_eq!(ErrorKind::InsufficientFunds.to_string(), "INSUFFICIENT_FUNDS");
    }
}
