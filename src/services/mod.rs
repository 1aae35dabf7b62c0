pub mod account_service;
pub mod ledger_engine;
pub mod locks;
pub mod query_service;
pub mod transfer_service;

pub use account_service::{AccountService, MovementOptions, DEMO_FUNDING_DESCRIPTION};
pub use ledger_engine::{LedgerEngine, LedgerReceipt, LedgerRequest, Operation, OperationState};
pub use locks::{AccountGuard, AccountLocks};
pub use query_service::{AccountTransactionSummary, OwnerSummary, QueryService, ReconciliationReport};
pub use transfer_service::{AccountIdentifier, TransferCommand, TransferService};
