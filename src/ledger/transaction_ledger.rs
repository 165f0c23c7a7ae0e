use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::actors::{EventPublisher, LifecycleEvent};
use crate::balance::BalanceAggregator;
use crate::ledger::AccountLocks;
use crate::models::{CashbackTransaction, LedgerError, Page, PageRequest, TransactionKind, TransactionOrigin, TransactionStatus, WithdrawalRequest, WithdrawalStatus};
use crate::storage::{Store, TransactionFilter, Write, WriteBatch};
use crate::types::{AccountId, Monetary, TransactionId, UserId};

/// Filters for listing a user's ledger entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionQuery {
    pub page: PageRequest,
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>
}

/// The authoritative log of cashback transactions and their transitions.
pub struct Ledger<S: Store> {
    store: Arc<S>,
    locks: Arc<AccountLocks>,
    balances: Arc<BalanceAggregator<S>>,
    events: EventPublisher
}

impl<S: Store> Ledger<S> {
    pub fn new(store: Arc<S>, locks: Arc<AccountLocks>, balances: Arc<BalanceAggregator<S>>, events: EventPublisher) -> Self {
        Self { store, locks, balances, events }
    }

    /// Opens an administrative PENDING/PENDING entry awaiting approval.
    pub async fn open(
        &self,
        user_id: UserId,
        account_id: AccountId,
        amount: Monetary,
        description: &str
    ) -> Result<CashbackTransaction, LedgerError> {
        validate_owner(&user_id, &account_id)?;

        let description = description.trim();

        if description.is_empty() {
            return Err(LedgerError::validation("description", "administrative entries need a description"));
        }

        let origin = TransactionOrigin::Administrative { description: description.to_string() };
        let transaction = CashbackTransaction::open(user_id, account_id, amount, origin, Utc::now());
        self.insert(WriteBatch::default(), transaction).await
    }

    /// Opens the PENDING/PENDING cashback entry of a conversion in the same
    /// atomic batch as the click's conversion, which `batch` must carry.
    pub(crate) async fn open_with(
        &self,
        batch: WriteBatch,
        user_id: UserId,
        account_id: AccountId,
        amount: Monetary,
        origin: TransactionOrigin
    ) -> Result<CashbackTransaction, LedgerError> {
        validate_owner(&user_id, &account_id)?;

        let TransactionOrigin::Conversion { click_token, .. } = &origin else {
            return Err(LedgerError::validation("origin", "only conversions open entries alongside other writes"));
        };

        let converts_click = batch.writes().iter().any(|write| {
            matches!(write, Write::ConvertClick(click) if click.token == *click_token)
        });

        if !converts_click {
            return Err(LedgerError::validation("origin", format!("click [{click_token}] is not converted in the same batch")));
        }

        let transaction = CashbackTransaction::open(user_id, account_id, amount, origin, Utc::now());
        self.insert(batch, transaction).await
    }

    /// Books an administrative EARNED/COMPLETED credit.
    pub async fn credit(
        &self,
        user_id: UserId,
        account_id: AccountId,
        amount: Monetary,
        description: &str
    ) -> Result<CashbackTransaction, LedgerError> {
        validate_owner(&user_id, &account_id)?;

        let description = description.trim();

        if description.is_empty() {
            return Err(LedgerError::validation("description", "administrative credits need a description"));
        }

        let transaction = CashbackTransaction::credit(user_id, account_id, amount, description.to_string(), Utc::now());
        self.insert(WriteBatch::default(), transaction).await
    }

    pub async fn approve(&self, id: TransactionId) -> Result<CashbackTransaction, LedgerError> {
        let account_id = self.transaction(id)?.account_id;
        let guard = self.locks.acquire(&account_id).await;

        let mut transaction = self.transaction(id)?;
        let expected = (transaction.kind(), transaction.status());

        if let Err(error) = transaction.approve(Utc::now()) {
            warn!("{error}");
            return Err(error);
        }

        let mut batch = WriteBatch::default();
        batch.update_transaction(expected, transaction.clone());
        self.store.apply(batch)?;
        self.balances.invalidate(&account_id).await;

        drop(guard);

        debug!("Transaction [{id}] for account [{account_id}] approved: [{}]", transaction.amount());

        self.events.publish(LifecycleEvent::TransactionApproved {
            transaction_id: transaction.id,
            user_id: transaction.user_id.clone(),
            amount: transaction.amount()
        });

        Ok(transaction)
    }

    pub async fn reject(&self, id: TransactionId, reason: &str) -> Result<CashbackTransaction, LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::validation("reason", "a rejection reason is required"));
        }

        let account_id = self.transaction(id)?.account_id;
        let guard = self.locks.acquire(&account_id).await;

        let mut transaction = self.transaction(id)?;
        let expected = (transaction.kind(), transaction.status());

        if let Err(error) = transaction.reject(reason, Utc::now()) {
            warn!("{error}");
            return Err(error);
        }

        let mut batch = WriteBatch::default();
        batch.update_transaction(expected, transaction.clone());
        self.store.apply(batch)?;
        self.balances.invalidate(&account_id).await;

        drop(guard);

        debug!("Transaction [{id}] for account [{account_id}] rejected");

        self.events.publish(LifecycleEvent::TransactionRejected {
            transaction_id: transaction.id,
            user_id: transaction.user_id.clone(),
            reason: transaction.rejection_reason().unwrap_or_default().to_string()
        });

        Ok(transaction)
    }

    /// Adds the WITHDRAWN/COMPLETED entry for a completed withdrawal to `batch`.
    ///
    /// The caller applies the batch together with the withdrawal's own update
    /// while holding the account lock. The store allows one such entry per withdrawal.
    pub fn record_withdrawal(&self, batch: &mut WriteBatch, withdrawal: &WithdrawalRequest) -> Result<CashbackTransaction, LedgerError> {
        let external_ref = match (withdrawal.status(), withdrawal.external_ref()) {
            (WithdrawalStatus::Completed, Some(external_ref)) => external_ref.to_string(),
            _ => return Err(LedgerError::invalid_withdrawal_state(withdrawal, "record a payout"))
        };

        let transaction = CashbackTransaction::withdrawn(
            withdrawal.user_id.clone(),
            withdrawal.account_id.clone(),
            withdrawal.net_amount(),
            withdrawal.id,
            external_ref,
            Utc::now()
        );

        batch.insert_transaction(transaction.clone());

        Ok(transaction)
    }

    pub fn transaction(&self, id: TransactionId) -> Result<CashbackTransaction, LedgerError> {
        self.store.transaction(id)?.ok_or_else(|| LedgerError::transaction_not_found(id))
    }

    /// A user's entries, newest first.
    pub fn list(&self, user_id: &str, query: TransactionQuery) -> Result<Page<CashbackTransaction>, LedgerError> {
        let filter = TransactionFilter {
            user_id: Some(user_id.to_string()),
            kind: query.kind,
            status: query.status,
            ..TransactionFilter::default()
        };

        Ok(Page::slice(self.store.transactions(&filter)?, query.page))
    }

    async fn insert(&self, mut batch: WriteBatch, transaction: CashbackTransaction) -> Result<CashbackTransaction, LedgerError> {
        let account_id = transaction.account_id.clone();
        let _guard = self.locks.acquire(&account_id).await;

        batch.insert_transaction(transaction.clone());
        self.store.apply(batch)?;
        self.balances.invalidate(&account_id).await;

        debug!(
            "Transaction [{}]:[{:?}/{:?}] of [{}] opened for account [{account_id}]",
            transaction.id,
            transaction.kind(),
            transaction.status(),
            transaction.amount()
        );

        Ok(transaction)
    }
}

fn validate_owner(user_id: &str, account_id: &str) -> Result<(), LedgerError> {
    if user_id.trim().is_empty() {
        return Err(LedgerError::validation("user_id", "an owning user is required"));
    }

    if account_id.trim().is_empty() {
        return Err(LedgerError::validation("account_id", "an owning account is required"));
    }

    Ok(())
}
