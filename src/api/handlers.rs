use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::api::requests::{
    CreateAccountRequest, FundAccountsRequest, ListTransactionsQuery, MoneyMovementRequest,
    TransferRequest, ValidationError, IDEMPOTENCY_KEY_HEADER,
};
use crate::api::responses::{
    AccountResponse, ApiError, ApiResponse, ErrorResponse, ListResponse, TransactionResponse,
};
use crate::error::ErrorKind;
use crate::observability::AggregatedHealth;
use crate::services::{
    AccountTransactionSummary, MovementOptions, OwnerSummary, ReconciliationReport, TransferCommand,
};
use uuid::Uuid;

use super::routes::AppState;

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

fn bad_request(message: String) -> ApiError {
    ApiError::new(
        StatusCode::BAD_REQUEST,
        ErrorResponse::new(ErrorKind::ValidationError.as_str(), message),
    )
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(request)| request)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

fn path<T>(segment: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    segment
        .map(|Path(value)| value)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

/// Optional client token from the `Idempotency-Key` header.
fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        None => Ok(None),
        Some(value) => {
            let key = value
                .to_str()
                .map_err(|_| bad_request("Idempotency-Key must be visible ASCII".to_string()))?
                .trim();
            if key.is_empty() {
                return Err(ApiError::validation(vec![ValidationError::new(
                    "Idempotency-Key",
                    "Idempotency-Key cannot be empty",
                )]));
            }
            Ok(Some(key.to_string()))
        }
    }
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health check endpoint.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<AggregatedHealth>>) {
    let health = state.health_checker.check_all().await;
    let status = if health.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(ApiResponse::success(health)))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics exporter not installed".to_string(),
        ),
    }
}

// ============================================================================
// Account Handlers
// ============================================================================

/// Create a new account.
pub async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> ApiResult<AccountResponse> {
    let request = body(payload)?;
    request.validate().map_err(ApiError::validation)?;

    let account = match request.opening_balance {
        Some(balance) => {
            let account_type = match request.account_type {
                Some(account_type) => account_type,
                None => state.accounts.default_account_type(),
            };
            state
                .accounts
                .create_account_with_balance(&request.owner_id, account_type, balance)
                .await?
        }
        None => {
            state
                .accounts
                .create_account(&request.owner_id, request.account_type)
                .await?
        }
    };

    created(AccountResponse::from(account))
}

/// Get account by ID.
pub async fn get_account(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<AccountResponse> {
    let account = state.accounts.get_account(path(id)?).await?;
    ok(AccountResponse::from(account))
}

/// Get account by its public account number.
pub async fn get_account_by_number(
    State(state): State<AppState>,
    number: Result<Path<String>, PathRejection>,
) -> ApiResult<AccountResponse> {
    let account = state.accounts.get_by_number(&path(number)?).await?;
    ok(AccountResponse::from(account))
}

pub async fn deposit(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<MoneyMovementRequest>, JsonRejection>,
) -> ApiResult<AccountResponse> {
    let account_id = path(id)?;
    let idempotency_key = idempotency_key(&headers)?;
    let request = body(payload)?;

    let account = state
        .accounts
        .deposit(
            account_id,
            request.amount,
            MovementOptions {
                description: request.description,
                idempotency_key,
            },
        )
        .await?;
    ok(AccountResponse::from(account))
}

pub async fn withdraw(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<MoneyMovementRequest>, JsonRejection>,
) -> ApiResult<AccountResponse> {
    let account_id = path(id)?;
    let idempotency_key = idempotency_key(&headers)?;
    let request = body(payload)?;

    let account = state
        .accounts
        .withdraw(
            account_id,
            request.amount,
            MovementOptions {
                description: request.description,
                idempotency_key,
            },
        )
        .await?;
    ok(AccountResponse::from(account))
}

/// Transactions touching an account, newest first.
pub async fn get_account_transactions(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ListResponse<TransactionResponse>> {
    let history = state.queries.history(path(id)?).await?;
    ok(ListResponse::new(
        history.into_iter().map(TransactionResponse::from).collect(),
    ))
}

pub async fn get_account_summary(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<AccountTransactionSummary> {
    ok(state.queries.account_summary(path(id)?).await?)
}

pub async fn get_account_reconciliation(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ReconciliationReport> {
    ok(state.queries.reconcile(path(id)?).await?)
}

// ============================================================================
// Owner Handlers
// ============================================================================

pub async fn list_owner_accounts(
    State(state): State<AppState>,
    owner_id: Result<Path<String>, PathRejection>,
) -> ApiResult<ListResponse<AccountResponse>> {
    let accounts = state.accounts.list_accounts(&path(owner_id)?).await?;
    ok(ListResponse::new(
        accounts.into_iter().map(AccountResponse::from).collect(),
    ))
}

pub async fn get_owner_summary(
    State(state): State<AppState>,
    owner_id: Result<Path<String>, PathRejection>,
) -> ApiResult<OwnerSummary> {
    ok(state.queries.summary(&path(owner_id)?).await?)
}

pub async fn list_owner_transactions(
    State(state): State<AppState>,
    owner_id: Result<Path<String>, PathRejection>,
) -> ApiResult<ListResponse<TransactionResponse>> {
    let history = state.queries.owner_history(&path(owner_id)?).await?;
    ok(ListResponse::new(
        history.into_iter().map(TransactionResponse::from).collect(),
    ))
}

/// Demo funding: deposits the amount into each of the owner's accounts.
pub async fn fund_owner_accounts(
    State(state): State<AppState>,
    owner_id: Result<Path<String>, PathRejection>,
    payload: Result<Json<FundAccountsRequest>, JsonRejection>,
) -> ApiResult<ListResponse<AccountResponse>> {
    let owner_id = path(owner_id)?;
    let request = body(payload)?;

    let funded = state.accounts.fund_all_accounts(&owner_id, request.amount).await?;
    ok(ListResponse::new(
        funded.into_iter().map(AccountResponse::from).collect(),
    ))
}

// ============================================================================
// Transfer and Transaction Handlers
// ============================================================================

pub async fn create_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResult<TransactionResponse> {
    let idempotency_key = idempotency_key(&headers)?;
    let request = body(payload)?;

    let transaction = state
        .transfers
        .transfer(TransferCommand {
            from_account_id: request.from_account_id,
            to: request.to,
            amount: request.amount,
            description: request.description,
            idempotency_key,
        })
        .await?;
    created(TransactionResponse::from(transaction))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<TransactionResponse> {
    let transaction = state.queries.transaction(path(id)?).await?;
    ok(TransactionResponse::from(transaction))
}

/// Most recent transactions across all accounts.
pub async fn list_transactions(
    State(state): State<AppState>,
    query: Result<Query<ListTransactionsQuery>, QueryRejection>,
) -> ApiResult<ListResponse<TransactionResponse>> {
    let Query(query) = query.map_err(|rejection| bad_request(rejection.body_text()))?;

    let recent = state.queries.recent(query.effective_limit()).await?;
    ok(ListResponse::new(
        recent.into_iter().map(TransactionResponse::from).collect(),
    ))
}
