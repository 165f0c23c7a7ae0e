use std::sync::Arc;

use tokio::task::JoinError;

use crate::actors::{NotificationActor, Notifier};
use crate::attribution::AttributionTracker;
use crate::balance::BalanceAggregator;
use crate::config::Config;
use crate::ledger::{AccountLocks, Ledger};
use crate::storage::Store;
use crate::withdrawal::WithdrawalProcessor;

/// Wires the cashback components around one store.
///
/// Every component shares the same [`AccountLocks`], which is what keeps
/// balance checks in the withdrawal processor consistent with ledger writes.
pub struct CashbackEngine<S: Store> {
    store: Arc<S>,
    ledger: Arc<Ledger<S>>,
    balances: Arc<BalanceAggregator<S>>,
    tracker: Arc<AttributionTracker<S>>,
    withdrawals: Arc<WithdrawalProcessor<S>>,
    notifications: NotificationActor
}

impl<S: Store> CashbackEngine<S> {
    /// Builds the engine. Must be called inside a tokio runtime.
    pub fn new<N: Notifier>(store: Arc<S>, config: &Config, notifier: Arc<N>) -> Self {
        let locks = Arc::new(AccountLocks::new());
        let notifications = NotificationActor::new(notifier);

        let balances = Arc::new(BalanceAggregator::new(
            store.clone(),
            locks.clone(),
            config.summary_cache_capacity,
            config.summary_cache_ttl
        ));

        let ledger = Arc::new(Ledger::new(store.clone(), locks.clone(), balances.clone(), notifications.publisher()));

        let tracker = Arc::new(AttributionTracker::new(
            store.clone(),
            ledger.clone(),
            config.commission_rate,
            config.stats_window_days
        ));

        let withdrawals = Arc::new(WithdrawalProcessor::new(
            store.clone(),
            locks,
            ledger.clone(),
            balances.clone(),
            notifications.publisher(),
            config.min_withdrawal,
            config.withdrawal_fee_rate
        ));

        Self { store, ledger, balances, tracker, withdrawals, notifications }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<Ledger<S>> {
        &self.ledger
    }

    pub fn balances(&self) -> &Arc<BalanceAggregator<S>> {
        &self.balances
    }

    pub fn tracker(&self) -> &Arc<AttributionTracker<S>> {
        &self.tracker
    }

    pub fn withdrawals(&self) -> &Arc<WithdrawalProcessor<S>> {
        &self.withdrawals
    }

    /// Delivers pending notifications and stops the notification task.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.notifications.despawn().await
    }
}
