use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::AccountId;

/// One async mutex per cashback account.
///
/// Every check-then-write against an account's balance runs while holding
/// that account's guard, which serializes those operations per account
/// while leaving other accounts untouched. An account's entry only lives
/// while someone holds or waits for its guard.
#[derive(Default)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>
}

/// Exclusive access to one account, released on drop.
pub struct AccountGuard<'a> {
    account_id: AccountId,
    locks: &'a DashMap<AccountId, Arc<Mutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, account_id: &str) -> AccountGuard<'_> {
        //NOTE: The clone happens under the shard lock, so pruning never sees a count of 1 for a lock in use
        let lock = self.locks.entry(account_id.to_string()).or_default().value().clone();

        AccountGuard {
            account_id: account_id.to_string(),
            locks: &self.locks,
            guard: Some(lock.lock_owned().await)
        }
    }

    /// Accounts with a live entry.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.remove_if(&self.account_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
