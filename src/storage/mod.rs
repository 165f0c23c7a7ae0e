mod memory_storage;
#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::models::{CashbackTransaction, Click, Entity, TransactionKind, TransactionStatus, WithdrawalRequest, WithdrawalStatus};
use crate::types::{AccountId, ClickToken, DateRange, TransactionId, UserId, WithdrawalId};

pub use memory_storage::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Unique constraint [{index}] violated by {entity:?} [{key}]")]
    UniqueViolation {
        entity: Entity,
        index: &'static str,
        key: String
    },
    #[error("Write guard failed for {entity:?} [{key}]")]
    GuardFailed {
        entity: Entity,
        key: String
    },
    #[error("{entity:?} [{key}] does not exist")]
    Missing {
        entity: Entity,
        key: String
    }
}

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum Write {
    InsertClick(Click),
    /// Replaces a click that must still be unconverted in the store.
    ConvertClick(Click),
    /// Fails on a reused id, or a second entry for the same click or withdrawal.
    InsertTransaction(CashbackTransaction),
    /// Replaces a transaction whose stored (kind, status) must equal `expected`.
    UpdateTransaction {
        expected: (TransactionKind, TransactionStatus),
        transaction: CashbackTransaction
    },
    InsertWithdrawal(WithdrawalRequest),
    /// Replaces a withdrawal whose stored status must equal `expected`.
    UpdateWithdrawal {
        expected: WithdrawalStatus,
        withdrawal: WithdrawalRequest
    }
}

/// Writes that are validated together and applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>
}

impl WriteBatch {
    pub fn insert_click(&mut self, click: Click) -> &mut Self {
        self.writes.push(Write::InsertClick(click));
        self
    }

    pub fn convert_click(&mut self, click: Click) -> &mut Self {
        self.writes.push(Write::ConvertClick(click));
        self
    }

    pub fn insert_transaction(&mut self, transaction: CashbackTransaction) -> &mut Self {
        self.writes.push(Write::InsertTransaction(transaction));
        self
    }

    pub fn update_transaction(&mut self, expected: (TransactionKind, TransactionStatus), transaction: CashbackTransaction) -> &mut Self {
        self.writes.push(Write::UpdateTransaction { expected, transaction });
        self
    }

    pub fn insert_withdrawal(&mut self, withdrawal: WithdrawalRequest) -> &mut Self {
        self.writes.push(Write::InsertWithdrawal(withdrawal));
        self
    }

    pub fn update_withdrawal(&mut self, expected: WithdrawalStatus, withdrawal: WithdrawalRequest) -> &mut Self {
        self.writes.push(Write::UpdateWithdrawal { expected, withdrawal });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub user_id: Option<UserId>,
    pub account_id: Option<AccountId>,
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub created: Option<DateRange>
}

impl TransactionFilter {
    pub fn matches(&self, transaction: &CashbackTransaction) -> bool {
        self.user_id.as_ref().is_none_or(|user_id| *user_id == transaction.user_id)
            && self.account_id.as_ref().is_none_or(|account_id| *account_id == transaction.account_id)
            && self.kind.is_none_or(|kind| kind == transaction.kind())
            && self.status.is_none_or(|status| status == transaction.status())
            && self.created.is_none_or(|range| range.contains(transaction.created_at))
    }
}

#[derive(Debug, Clone, Default)]
pub struct WithdrawalFilter {
    pub user_id: Option<UserId>,
    pub account_id: Option<AccountId>,
    pub status: Option<WithdrawalStatus>
}

impl WithdrawalFilter {
    pub fn matches(&self, withdrawal: &WithdrawalRequest) -> bool {
        self.user_id.as_ref().is_none_or(|user_id| *user_id == withdrawal.user_id)
            && self.account_id.as_ref().is_none_or(|account_id| *account_id == withdrawal.account_id)
            && self.status.is_none_or(|status| status == withdrawal.status())
    }
}

/// Durable storage for clicks, ledger entries and withdrawal requests.
///
/// Reads never observe half of a batch. List reads return records newest first.
pub trait Store: Send + Sync + 'static {
    fn click(&self, token: &ClickToken) -> Result<Option<Click>, StoreError>;
    fn clicks_for_user(&self, user_id: &str, range: &DateRange) -> Result<Vec<Click>, StoreError>;
    fn transaction(&self, id: TransactionId) -> Result<Option<CashbackTransaction>, StoreError>;
    fn transaction_for_click(&self, token: &ClickToken) -> Result<Option<CashbackTransaction>, StoreError>;
    fn transaction_for_withdrawal(&self, id: WithdrawalId) -> Result<Option<CashbackTransaction>, StoreError>;
    fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<CashbackTransaction>, StoreError>;
    fn withdrawal(&self, id: WithdrawalId) -> Result<Option<WithdrawalRequest>, StoreError>;
    fn withdrawals(&self, filter: &WithdrawalFilter) -> Result<Vec<WithdrawalRequest>, StoreError>;
    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;
}
