use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::errors::LedgerError;
use crate::models::WithdrawalStatus;
use crate::types::{AccountId, Monetary, Rate, UserId, WithdrawalId};

/// Where the payout should be sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutMethod {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>
}

impl PayoutMethod {
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into(), ..Self::default() }
    }
}

/// One payout attempt.
///
/// Status only moves forward: PENDING -> PROCESSING -> COMPLETED, with
/// REJECTED reachable from either non-terminal state. `net_amount` is
/// computed from the fee rate at creation and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub account_id: AccountId,
    amount: Monetary,
    fee_rate: Rate,
    fee: Monetary,
    net_amount: Monetary,
    pub payout: PayoutMethod,
    status: WithdrawalStatus,
    external_ref: Option<String>,
    rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>
}

impl WithdrawalRequest {
    pub fn new(
        user_id: UserId,
        account_id: AccountId,
        amount: Monetary,
        fee_rate: Rate,
        payout: PayoutMethod,
        now: DateTime<Utc>
    ) -> Result<Self, LedgerError> {
        let fee = amount.percent(fee_rate)
            .map_err(|error| LedgerError::validation("amount", error.to_string()))?;
        let net_amount = amount.checked_sub(fee)
            .ok_or_else(|| LedgerError::validation("amount", "fee exceeds the requested amount"))?;

        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            account_id,
            amount,
            fee_rate,
            fee,
            net_amount,
            payout,
            status: WithdrawalStatus::Pending,
            external_ref: None,
            rejection_reason: None,
            created_at: now,
            processed_at: None,
            completed_at: None,
            rejected_at: None
        })
    }

    pub fn amount(&self) -> Monetary {
        self.amount
    }

    pub fn fee_rate(&self) -> Rate {
        self.fee_rate
    }

    pub fn fee(&self) -> Monetary {
        self.fee
    }

    pub fn net_amount(&self) -> Monetary {
        self.net_amount
    }

    pub fn status(&self) -> WithdrawalStatus {
        self.status
    }

    pub fn external_ref(&self) -> Option<&str> {
        self.external_ref.as_deref()
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn rejected_at(&self) -> Option<DateTime<Utc>> {
        self.rejected_at
    }

    /// Open requests hold their requested amount against the balance.
    pub fn is_open(&self) -> bool {
        matches!(self.status, WithdrawalStatus::Pending | WithdrawalStatus::Processing)
    }

    pub fn process(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.status != WithdrawalStatus::Pending {
            return Err(LedgerError::invalid_withdrawal_state(self, "process"));
        }

        self.status = WithdrawalStatus::Processing;
        self.processed_at = Some(now);

        Ok(())
    }

    pub fn complete(&mut self, external_ref: &str, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let external_ref = external_ref.trim();

        if external_ref.is_empty() {
            return Err(LedgerError::validation("external_ref", "an external transaction reference is required"));
        }

        if self.status != WithdrawalStatus::Processing {
            return Err(LedgerError::invalid_withdrawal_state(self, "complete"));
        }

        self.status = WithdrawalStatus::Completed;
        self.external_ref = Some(external_ref.to_string());
        self.completed_at = Some(now);

        Ok(())
    }

    pub fn reject(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let reason = reason.trim();

        if reason.is_empty() {
            return Err(LedgerError::validation("reason", "a rejection reason is required"));
        }

        if !self.is_open() {
            return Err(LedgerError::invalid_withdrawal_state(self, "reject"));
        }

        self.status = WithdrawalStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.rejected_at = Some(now);

        Ok(())
    }
}
