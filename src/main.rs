use ledger_engine::api::{create_router, AppState};
use ledger_engine::config::Settings;
use ledger_engine::idempotency::IdempotencyCleanupJob;
use ledger_engine::models::RandomAccountNumbers;
use ledger_engine::observability::{init_logging, init_metrics, LogConfig};
use ledger_engine::repositories::{
    AccountRepository, AccountStore, InMemoryAccountStore, InMemoryTransactionLog, TransactionLog,
    TransactionRepository,
};
use ledger_engine::services::LedgerEngine;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const IDEMPOTENCY_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    settings.ledger.validate()?;

    init_logging(&LogConfig::from(&settings.logging));
    info!("Configuration loaded");

    let metrics_handle = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus exporter unavailable, /metrics disabled");
            None
        }
    };

    let (backend, accounts, transactions): (&'static str, Arc<dyn AccountStore>, Arc<dyn TransactionLog>) =
        match &settings.database {
            Some(database) => {
                info!("Connecting to database...");
                let pool = PgPoolOptions::new()
                    .max_connections(database.pool_size)
                    .acquire_timeout(Duration::from_secs(5))
                    .connect(&database.url)
                    .await?;
                info!("Database connection established");

                info!("Running database migrations...");
                sqlx::migrate!("./migrations").run(&pool).await?;
                info!("Migrations applied successfully");

                let accounts: Arc<dyn AccountStore> = Arc::new(
                    AccountRepository::new(pool.clone())
                        .with_number_attempts(settings.ledger.account_number_attempts),
                );
                let transactions: Arc<dyn TransactionLog> = Arc::new(TransactionRepository::new(pool));
                ("postgres", accounts, transactions)
            }
            None => {
                warn!("No [database] configured, using in-memory storage");
                let accounts: Arc<dyn AccountStore> = Arc::new(InMemoryAccountStore::with_generator(
                    Arc::new(RandomAccountNumbers),
                    settings.ledger.account_number_attempts,
                ));
                let transactions: Arc<dyn TransactionLog> = Arc::new(InMemoryTransactionLog::new());
                ("memory", accounts, transactions)
            }
        };

    let engine = LedgerEngine::new(accounts, transactions)
        .with_lock_timeout(settings.ledger.lock_timeout())
        .with_idempotency_ttl(settings.ledger.idempotency_ttl());

    IdempotencyCleanupJob::new(Arc::clone(engine.idempotency()), IDEMPOTENCY_CLEANUP_INTERVAL).start();

    let mut state = AppState::new(engine, &settings.ledger, backend)?;
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }

    let address = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, backend, "Ledger engine listening");

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
