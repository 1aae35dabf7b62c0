use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::requests::ValidationError;
use crate::error::{AppError, ErrorKind};
use crate::models::{Account, AccountType, Transaction, TransactionStatus, TransactionType};

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<ValidationErrorDetail>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Validation error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

impl From<ValidationError> for ValidationErrorDetail {
    fn from(error: ValidationError) -> Self {
        Self {
            field: error.field,
            message: error.message,
        }
    }
}

/// A failed request: HTTP status plus the wrapped error body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ApiResponse<()>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: ErrorResponse) -> Self {
        Self {
            status,
            body: ApiResponse::<()>::error(error),
        }
    }

    pub fn validation(details: Vec<ValidationError>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(ErrorKind::ValidationError.as_str(), "Request validation failed")
                .with_details(details.into_iter().map(ValidationErrorDetail::from).collect()),
        )
    }

    /// Machine-readable code of the error, if any.
    pub fn code(&self) -> Option<&str> {
        self.body.error.as_ref().map(|e| e.code.as_str())
    }
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidAmount | ErrorKind::SameAccountTransfer | ErrorKind::ValidationError => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::IdempotencyConflict => StatusCode::CONFLICT,
        ErrorKind::DuplicateAccountNumber
        | ErrorKind::InvalidStateTransition
        | ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let kind = err.kind();
        let status = status_for(kind);

        // Internal details stay in the logs.
        let message = if status.is_server_error() {
            tracing::error!(error = %err, code = kind.as_str(), "Request failed");
            "An internal error occurred".to_string()
        } else {
            err.detail()
        };

        Self::new(status, ErrorResponse::new(kind.as_str(), message))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Account response DTO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub owner_id: String,
    pub account_number: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            owner_id: account.owner_id,
            account_number: account.account_number,
            account_type: account.account_type,
            balance: account.balance,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// Transaction response DTO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: i64,
    pub transaction_type: TransactionType,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub amount: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub transaction_date: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            transaction_type: tx.transaction_type,
            from_account_id: tx.from_account_id,
            to_account_id: tx.to_account_id,
            amount: tx.amount,
            description: tx.description,
            status: tx.status,
            transaction_date: tx.transaction_date,
        }
    }
}

/// List response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            total: items.len(),
            items,
        }
    }
}
