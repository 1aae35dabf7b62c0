pub mod account;
pub mod transaction;

pub use account::{
    check_amount_range, max_amount, Account, AccountNumberGenerator, AccountType,
    RandomAccountNumbers, AMOUNT_SCALE,
};
pub use transaction::{NewTransaction, Transaction, TransactionStatus, TransactionType};
