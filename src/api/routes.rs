use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::config::LedgerSettings;
use crate::error::Result;
use crate::observability::HealthChecker;
use crate::services::{AccountService, LedgerEngine, QueryService, TransferService};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub transfers: TransferService,
    pub queries: QueryService,
    pub metrics_handle: Option<PrometheusHandle>,
    pub health_checker: Arc<HealthChecker>,
}

impl AppState {
    /// Builds every facade over one shared engine. `backend` names the
    /// storage in health reports.
    pub fn new(engine: LedgerEngine, settings: &LedgerSettings, backend: &'static str) -> Result<Self> {
        let accounts = Arc::clone(engine.accounts());
        let transactions = Arc::clone(engine.transactions());

        Ok(Self {
            accounts: AccountService::from_settings(engine.clone(), settings)?,
            transfers: TransferService::new(engine),
            queries: QueryService::new(Arc::clone(&accounts), Arc::clone(&transactions)),
            metrics_handle: None,
            health_checker: Arc::new(HealthChecker::new(backend, accounts, transactions)),
        })
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Account endpoints
        .route("/accounts", post(handlers::create_account))
        .route("/accounts/number/:number", get(handlers::get_account_by_number))
        .route("/accounts/:id", get(handlers::get_account))
        .route("/accounts/:id/deposit", post(handlers::deposit))
        .route("/accounts/:id/withdraw", post(handlers::withdraw))
        .route("/accounts/:id/transactions", get(handlers::get_account_transactions))
        .route("/accounts/:id/summary", get(handlers::get_account_summary))
        .route("/accounts/:id/reconciliation", get(handlers::get_account_reconciliation))
        // Owner endpoints
        .route("/owners/:owner_id/accounts", get(handlers::list_owner_accounts))
        .route("/owners/:owner_id/summary", get(handlers::get_owner_summary))
        .route("/owners/:owner_id/transactions", get(handlers::list_owner_transactions))
        .route("/owners/:owner_id/fund", post(handlers::fund_owner_accounts))
        // Transfer and transaction endpoints
        .route("/transfers", post(handlers::create_transfer))
        .route("/transactions", get(handlers::list_transactions))
        .route("/transactions/:id", get(handlers::get_transaction))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
