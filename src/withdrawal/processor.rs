use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::actors::{EventPublisher, LifecycleEvent};
use crate::balance::BalanceAggregator;
use crate::ledger::{AccountLocks, Ledger};
use crate::models::{CashbackTransaction, LedgerError, Page, PageRequest, PayoutMethod, WithdrawalRequest, WithdrawalStatus};
use crate::storage::{Store, WithdrawalFilter, WriteBatch};
use crate::types::{AccountId, Monetary, Rate, UserId, WithdrawalId};

/// A user's request to pay out part of their balance.
#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub user_id: UserId,
    pub account_id: AccountId,
    pub amount: Monetary,
    pub payout: PayoutMethod
}

/// Result of [`WithdrawalProcessor::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedWithdrawal {
    pub withdrawal: WithdrawalRequest,
    pub transaction: CashbackTransaction,
    /// Set when the call repeated an earlier completion and wrote nothing.
    pub replayed: bool
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WithdrawalQuery {
    pub page: PageRequest,
    pub status: Option<WithdrawalStatus>
}

/// Validates withdrawal requests and drives them through the payout lifecycle.
pub struct WithdrawalProcessor<S: Store> {
    store: Arc<S>,
    locks: Arc<AccountLocks>,
    ledger: Arc<Ledger<S>>,
    balances: Arc<BalanceAggregator<S>>,
    events: EventPublisher,
    min_withdrawal: Monetary,
    fee_rate: RwLock<Rate>
}

impl<S: Store> WithdrawalProcessor<S> {
    pub fn new(
        store: Arc<S>,
        locks: Arc<AccountLocks>,
        ledger: Arc<Ledger<S>>,
        balances: Arc<BalanceAggregator<S>>,
        events: EventPublisher,
        min_withdrawal: Monetary,
        fee_rate: Rate
    ) -> Self {
        Self {
            store,
            locks,
            ledger,
            balances,
            events,
            min_withdrawal,
            fee_rate: RwLock::new(fee_rate)
        }
    }

    /// Changes the fee rate for requests created from now on.
    pub async fn set_fee_rate(&self, fee_rate: Rate) {
        *self.fee_rate.write().await = fee_rate;
    }

    /// Creates a PENDING request if the account can cover it.
    ///
    /// The balance check and the insert happen under the account lock, and
    /// open requests count against the balance, so concurrent requests can
    /// never jointly exceed it.
    pub async fn create(&self, request: NewWithdrawal) -> Result<WithdrawalRequest, LedgerError> {
        self.validate(&request)?;

        let fee_rate = *self.fee_rate.read().await;
        let account_id = request.account_id.clone();
        let _guard = self.locks.acquire(&account_id).await;

        let summary = self.balances.compute(&account_id)?;

        if request.amount > summary.withdrawable {
            let error = LedgerError::insufficient_funds(&account_id, request.amount, summary.withdrawable);
            warn!("{error}");
            return Err(error);
        }

        let withdrawal = WithdrawalRequest::new(
            request.user_id,
            request.account_id,
            request.amount,
            fee_rate,
            request.payout,
            Utc::now()
        )?;

        let mut batch = WriteBatch::default();
        batch.insert_withdrawal(withdrawal.clone());
        self.store.apply(batch)?;
        self.balances.invalidate(&account_id).await;

        debug!(
            "Withdrawal [{}] of [{}] (fee [{}], net [{}]) requested for account [{account_id}]",
            withdrawal.id,
            withdrawal.amount(),
            withdrawal.fee(),
            withdrawal.net_amount()
        );

        Ok(withdrawal)
    }

    /// PENDING -> PROCESSING.
    pub async fn process(&self, id: WithdrawalId) -> Result<WithdrawalRequest, LedgerError> {
        let account_id = self.withdrawal(id)?.account_id;
        let _guard = self.locks.acquire(&account_id).await;

        let mut withdrawal = self.withdrawal(id)?;
        let expected = withdrawal.status();

        if let Err(error) = withdrawal.process(Utc::now()) {
            warn!("{error}");
            return Err(error);
        }

        let mut batch = WriteBatch::default();
        batch.update_withdrawal(expected, withdrawal.clone());
        self.store.apply(batch)?;

        debug!("Withdrawal [{id}] for account [{account_id}] is processing");

        Ok(withdrawal)
    }

    /// PROCESSING -> COMPLETED, booking the WITHDRAWN entry in the same batch.
    ///
    /// Repeating a completion with the same external reference returns the
    /// stored outcome without writing anything.
    pub async fn complete(&self, id: WithdrawalId, external_ref: &str) -> Result<CompletedWithdrawal, LedgerError> {
        let external_ref = external_ref.trim();

        if external_ref.is_empty() {
            return Err(LedgerError::validation("external_ref", "an external transaction reference is required"));
        }

        let account_id = self.withdrawal(id)?.account_id;
        let guard = self.locks.acquire(&account_id).await;

        let mut withdrawal = self.withdrawal(id)?;

        if withdrawal.status() == WithdrawalStatus::Completed && withdrawal.external_ref() == Some(external_ref) {
            let transaction = self.store.transaction_for_withdrawal(id)?
                .ok_or_else(|| LedgerError::transaction_not_found(format!("payout of withdrawal {id}")))?;

            debug!("Withdrawal [{id}] completion with [{external_ref}] replayed");

            return Ok(CompletedWithdrawal { withdrawal, transaction, replayed: true });
        }

        let expected = withdrawal.status();

        if let Err(error) = withdrawal.complete(external_ref, Utc::now()) {
            warn!("{error}");
            return Err(error);
        }

        let mut batch = WriteBatch::default();
        batch.update_withdrawal(expected, withdrawal.clone());
        let transaction = self.ledger.record_withdrawal(&mut batch, &withdrawal)?;

        self.store.apply(batch)?;
        self.balances.invalidate(&account_id).await;

        drop(guard);

        debug!(
            "Withdrawal [{id}] for account [{account_id}] completed with [{external_ref}], payout [{}] booked as [{}]",
            withdrawal.net_amount(),
            transaction.id
        );

        self.events.publish(LifecycleEvent::WithdrawalCompleted {
            withdrawal_id: withdrawal.id,
            user_id: withdrawal.user_id.clone(),
            net_amount: withdrawal.net_amount(),
            external_ref: external_ref.to_string()
        });

        Ok(CompletedWithdrawal { withdrawal, transaction, replayed: false })
    }

    /// PENDING or PROCESSING -> REJECTED, releasing the reserved amount.
    pub async fn reject(&self, id: WithdrawalId, reason: &str) -> Result<WithdrawalRequest, LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::validation("reason", "a rejection reason is required"));
        }

        let account_id = self.withdrawal(id)?.account_id;
        let guard = self.locks.acquire(&account_id).await;

        let mut withdrawal = self.withdrawal(id)?;
        let expected = withdrawal.status();

        if let Err(error) = withdrawal.reject(reason, Utc::now()) {
            warn!("{error}");
            return Err(error);
        }

        let mut batch = WriteBatch::default();
        batch.update_withdrawal(expected, withdrawal.clone());
        self.store.apply(batch)?;
        self.balances.invalidate(&account_id).await;

        drop(guard);

        debug!("Withdrawal [{id}] for account [{account_id}] rejected, [{}] released", withdrawal.amount());

        self.events.publish(LifecycleEvent::WithdrawalRejected {
            withdrawal_id: withdrawal.id,
            user_id: withdrawal.user_id.clone(),
            reason: withdrawal.rejection_reason().unwrap_or_default().to_string()
        });

        Ok(withdrawal)
    }

    pub fn withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalRequest, LedgerError> {
        self.store.withdrawal(id)?.ok_or_else(|| LedgerError::withdrawal_not_found(id))
    }

    /// A user's requests, newest first.
    pub fn list(&self, user_id: &str, query: WithdrawalQuery) -> Result<Page<WithdrawalRequest>, LedgerError> {
        let filter = WithdrawalFilter {
            user_id: Some(user_id.to_string()),
            status: query.status,
            ..WithdrawalFilter::default()
        };

        Ok(Page::slice(self.store.withdrawals(&filter)?, query.page))
    }

    fn validate(&self, request: &NewWithdrawal) -> Result<(), LedgerError> {
        if request.user_id.trim().is_empty() {
            return Err(LedgerError::validation("user_id", "an owning user is required"));
        }

        if request.account_id.trim().is_empty() {
            return Err(LedgerError::validation("account_id", "an owning account is required"));
        }

        if request.amount.is_zero() || request.amount < self.min_withdrawal {
            return Err(LedgerError::validation(
                "amount",
                format!("minimum withdrawal amount is {}", self.min_withdrawal)
            ));
        }

        if request.payout.method.trim().is_empty() {
            return Err(LedgerError::validation("payout.method", "a payout method is required"));
        }

        Ok(())
    }
}
