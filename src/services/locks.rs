use crate::error::{AppError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Exclusive access to a set of accounts, released on drop.
#[derive(Debug)]
pub struct AccountGuard {
    account_ids: Vec<Uuid>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountGuard {
    /// Locked accounts in acquisition order.
    pub fn account_ids(&self) -> &[Uuid] {
        &self.account_ids
    }
}

/// One async mutex per account, created on first use.
///
/// Multi-account callers always lock in ascending id order, so two transfers
/// moving money in opposite directions between the same pair cannot deadlock.
#[derive(Debug, Default)]
pub struct AccountLocks {
    /// One entry per account ever locked, never evicted. Accounts are never
    /// deleted, so this is bounded by the number of accounts.
    slots: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, account_id: Uuid) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(account_id).or_default())
    }

    /// Locks every account in `account_ids`, waiting at most `timeout` in total.
    pub async fn acquire(&self, account_ids: &[Uuid], timeout: Duration) -> Result<AccountGuard> {
        let mut ordered = account_ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let acquisition = async {
            let mut guards = Vec::with_capacity(ordered.len());
            for id in &ordered {
                guards.push(self.slot(*id).await.lock_owned().await);
            }
            guards
        };

        match tokio::time::timeout(timeout, acquisition).await {
            Ok(guards) => Ok(AccountGuard {
                account_ids: ordered,
                _guards: guards,
            }),
            Err(_) => Err(AppError::Internal(anyhow::anyhow!(
                "timed out after {:?} waiting for account locks",
                timeout
            ))),
        }
    }

    /// Number of accounts that have ever been locked.
    pub async fn tracked(&self) -> usize {
        self.slots.lock().await.len()
    }
}
