pub mod account_repository;
pub mod account_store;
pub mod transaction_log;
pub mod transaction_repository;

pub use account_repository::AccountRepository;
pub use account_store::{AccountStore, InMemoryAccountStore};
pub use transaction_log::{InMemoryTransactionLog, TransactionLog};
pub use transaction_repository::TransactionRepository;
