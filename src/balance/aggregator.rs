use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use tracing::{debug, error};

use crate::ledger::AccountLocks;
use crate::models::{Bucket, CashbackTransaction, LedgerError, WithdrawalRequest};
use crate::storage::{Store, TransactionFilter, WithdrawalFilter};
use crate::types::{AccountId, DateRange, Monetary};

/// Derived totals for one cashback account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    /// Direct credits, EARNED/COMPLETED.
    pub total_earned: Monetary,
    /// Conversions awaiting review, PENDING/PENDING.
    pub total_pending: Monetary,
    /// APPROVED/COMPLETED.
    pub total_approved: Monetary,
    /// Payouts, WITHDRAWN/COMPLETED.
    pub total_withdrawn: Monetary,
    /// `total_earned + total_approved - total_withdrawn`.
    ///
    /// EARNED rows are administrative credits that never pass through
    /// approval, so they count here as soon as they are booked. Reports that
    /// treat only APPROVED cashback as spendable (`total_approved -
    /// total_withdrawn`) will show a lower figure for accounts with credits.
    pub available_balance: Monetary,
    /// Requested amounts of withdrawals still PENDING or PROCESSING.
    pub reserved: Monetary,
    /// `available_balance - reserved`, the most a new withdrawal may ask for.
    pub withdrawable: Monetary
}

impl BalanceSummary {
    pub fn from_records(account_id: &str, transactions: &[CashbackTransaction], withdrawals: &[WithdrawalRequest]) -> Self {
        let total = |bucket: Bucket| -> Monetary {
            transactions.iter()
                .filter(|transaction| transaction.bucket() == Some(bucket))
                .map(CashbackTransaction::amount)
                .sum()
        };

        let total_earned = total(Bucket::Earned);
        let total_pending = total(Bucket::Pending);
        let total_approved = total(Bucket::Approved);
        let total_withdrawn = total(Bucket::Withdrawn);

        let credited = total_earned.checked_add(total_approved).unwrap_or_else(|| {
            error!("Credited total overflowed for account [{account_id}]");
            Monetary::ZERO
        });

        let available_balance = credited.checked_sub(total_withdrawn).unwrap_or_else(|| {
            error!("Account [{account_id}] has withdrawn [{total_withdrawn}] against credits of [{credited}]");
            Monetary::ZERO
        });

        let reserved = withdrawals.iter()
            .filter(|withdrawal| withdrawal.is_open())
            .map(WithdrawalRequest::amount)
            .sum();

        Self {
            total_earned,
            total_pending,
            total_approved,
            total_withdrawn,
            available_balance,
            reserved,
            withdrawable: available_balance.saturating_sub(reserved)
        }
    }
}

/// Read-side totals computed from the ledger.
///
/// Summaries served by [`BalanceAggregator::summary`] are cached per account.
/// Every ledger write invalidates its account's entry while holding the
/// account lock, and summaries are computed under the same lock, so a cached
/// value never outlives the rows it was computed from.
pub struct BalanceAggregator<S: Store> {
    store: Arc<S>,
    locks: Arc<AccountLocks>,
    cache: Cache<AccountId, BalanceSummary>
}

impl<S: Store> BalanceAggregator<S> {
    pub fn new(store: Arc<S>, locks: Arc<AccountLocks>, capacity: u64, time_to_live: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(time_to_live)
            .build();

        Self { store, locks, cache }
    }

    pub async fn summary(&self, account_id: &str) -> Result<BalanceSummary, LedgerError> {
        if let Some(summary) = self.cache.get(account_id).await {
            return Ok(summary);
        }

        let _guard = self.locks.acquire(account_id).await;

        if let Some(summary) = self.cache.get(account_id).await {
            return Ok(summary);
        }

        let summary = self.compute(account_id)?;
        self.cache.insert(account_id.to_string(), summary).await;

        debug!("Balance summary for account [{account_id}] computed: available [{}]", summary.available_balance);

        Ok(summary)
    }

    /// Totals over rows created inside `range`. Never cached.
    pub fn summary_in_range(&self, account_id: &str, range: DateRange) -> Result<BalanceSummary, LedgerError> {
        let filter = TransactionFilter {
            account_id: Some(account_id.to_string()),
            created: Some(range),
            ..TransactionFilter::default()
        };

        let transactions = self.store.transactions(&filter)?;
        let withdrawals: Vec<WithdrawalRequest> = self.open_withdrawals(account_id)?
            .into_iter()
            .filter(|withdrawal| range.contains(withdrawal.created_at))
            .collect();

        Ok(BalanceSummary::from_records(account_id, &transactions, &withdrawals))
    }

    /// Totals straight from the store, bypassing the cache.
    ///
    /// Callers that act on the result must hold the account lock.
    pub fn compute(&self, account_id: &str) -> Result<BalanceSummary, LedgerError> {
        let filter = TransactionFilter {
            account_id: Some(account_id.to_string()),
            ..TransactionFilter::default()
        };

        let transactions = self.store.transactions(&filter)?;
        let withdrawals = self.open_withdrawals(account_id)?;

        Ok(BalanceSummary::from_records(account_id, &transactions, &withdrawals))
    }

    /// Drops the cached summary. Call while holding the account lock.
    pub async fn invalidate(&self, account_id: &str) {
        self.cache.invalidate(account_id).await;
    }

    fn open_withdrawals(&self, account_id: &str) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        let filter = WithdrawalFilter {
            account_id: Some(account_id.to_string()),
            ..WithdrawalFilter::default()
        };

        Ok(self.store.withdrawals(&filter)?
            .into_iter()
            .filter(WithdrawalRequest::is_open)
            .collect())
    }
}
