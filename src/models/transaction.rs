use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::errors::LedgerError;
use crate::models::{TransactionKind, TransactionStatus};
use crate::types::{AccountId, AffiliateId, ClickToken, Monetary, ProductId, Rate, StoreId, TransactionId, UserId, WithdrawalId};

/// Where a ledger entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum TransactionOrigin {
    /// A merchant-reported purchase attributed to a click.
    Conversion {
        click_token: ClickToken,
        order_ref: String,
        order_amount: Monetary,
        store_id: StoreId,
        product_id: ProductId,
        affiliate_id: AffiliateId,
        commission_rate: Rate
    },
    /// An operator entry.
    Administrative {
        description: String
    },
    /// The payout of a completed withdrawal request.
    Withdrawal {
        withdrawal_id: WithdrawalId,
        external_ref: String
    }
}

/// Which aggregate total a ledger entry contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Earned,
    Pending,
    Approved,
    Withdrawn
}

/// A single ledger entry.
///
/// The amount is fixed at creation. Kind and status are only reachable
/// through the constructors and the `approve`/`reject` transitions, so a
/// row can only ever hold one of the legal (kind, status) pairs:
///
/// | kind      | status    | terminal |
/// |-----------|-----------|----------|
/// | PENDING   | PENDING   | no       |
/// | APPROVED  | COMPLETED | yes      |
/// | REJECTED  | FAILED    | yes      |
/// | EARNED    | COMPLETED | yes      |
/// | WITHDRAWN | COMPLETED | yes      |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashbackTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub account_id: AccountId,
    kind: TransactionKind,
    status: TransactionStatus,
    amount: Monetary,
    pub origin: TransactionOrigin,
    rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>
}

impl CashbackTransaction {
    /// A PENDING/PENDING entry awaiting approval.
    pub fn open(user_id: UserId, account_id: AccountId, amount: Monetary, origin: TransactionOrigin, now: DateTime<Utc>) -> Self {
        Self::with_state(user_id, account_id, amount, origin, TransactionKind::Pending, TransactionStatus::Pending, now)
    }

    /// A direct administrative credit, EARNED/COMPLETED.
    pub fn credit(user_id: UserId, account_id: AccountId, amount: Monetary, description: String, now: DateTime<Utc>) -> Self {
        let origin = TransactionOrigin::Administrative { description };
        Self::with_state(user_id, account_id, amount, origin, TransactionKind::Earned, TransactionStatus::Completed, now)
    }

    /// The payout entry of a completed withdrawal, WITHDRAWN/COMPLETED.
    pub fn withdrawn(
        user_id: UserId,
        account_id: AccountId,
        amount: Monetary,
        withdrawal_id: WithdrawalId,
        external_ref: String,
        now: DateTime<Utc>
    ) -> Self {
        let origin = TransactionOrigin::Withdrawal { withdrawal_id, external_ref };
        Self::with_state(user_id, account_id, amount, origin, TransactionKind::Withdrawn, TransactionStatus::Completed, now)
    }

    fn with_state(
        user_id: UserId,
        account_id: AccountId,
        amount: Monetary,
        origin: TransactionOrigin,
        kind: TransactionKind,
        status: TransactionStatus,
        now: DateTime<Utc>
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            account_id,
            kind,
            status,
            amount,
            origin,
            rejection_reason: None,
            created_at: now,
            approved_at: None,
            rejected_at: None
        }
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn amount(&self) -> Monetary {
        self.amount
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn rejected_at(&self) -> Option<DateTime<Utc>> {
        self.rejected_at
    }

    pub fn click_token(&self) -> Option<&ClickToken> {
        match &self.origin {
            TransactionOrigin::Conversion { click_token, .. } => Some(click_token),
            _ => None
        }
    }

    pub fn withdrawal_id(&self) -> Option<WithdrawalId> {
        match &self.origin {
            TransactionOrigin::Withdrawal { withdrawal_id, .. } => Some(*withdrawal_id),
            _ => None
        }
    }

    pub fn order_ref(&self) -> Option<&str> {
        match &self.origin {
            TransactionOrigin::Conversion { order_ref, .. } => Some(order_ref),
            _ => None
        }
    }

    pub fn commission_rate(&self) -> Option<Rate> {
        match &self.origin {
            TransactionOrigin::Conversion { commission_rate, .. } => Some(*commission_rate),
            _ => None
        }
    }

    pub fn is_terminal(&self) -> bool {
        !(self.kind == TransactionKind::Pending && self.status == TransactionStatus::Pending)
    }

    /// The aggregate total this entry counts towards, if any.
    pub fn bucket(&self) -> Option<Bucket> {
        match (self.kind, self.status) {
            (TransactionKind::Earned, TransactionStatus::Completed) => Some(Bucket::Earned),
            (TransactionKind::Pending, TransactionStatus::Pending) => Some(Bucket::Pending),
            (TransactionKind::Approved, TransactionStatus::Completed) => Some(Bucket::Approved),
            (TransactionKind::Withdrawn, TransactionStatus::Completed) => Some(Bucket::Withdrawn),
            _ => None
        }
    }

    /// PENDING/PENDING -> APPROVED/COMPLETED.
    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.is_terminal() {
            return Err(LedgerError::invalid_transaction_state(self, "approve"));
        }

        self.kind = TransactionKind::Approved;
        self.status = TransactionStatus::Completed;
        self.approved_at = Some(now);

        Ok(())
    }

    /// PENDING/PENDING -> REJECTED/FAILED. The reason must not be blank.
    pub fn reject(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let reason = reason.trim();

        if reason.is_empty() {
            return Err(LedgerError::validation("reason", "a rejection reason is required"));
        }

        if self.is_terminal() {
            return Err(LedgerError::invalid_transaction_state(self, "reject"));
        }

        self.kind = TransactionKind::Rejected;
        self.status = TransactionStatus::Failed;
        self.rejection_reason = Some(reason.to_string());
        self.rejected_at = Some(now);

        Ok(())
    }
}
