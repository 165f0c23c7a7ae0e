use crate::models::{CashbackTransaction, WithdrawalRequest};
use crate::storage::StoreError;
use crate::types::{AccountId, ClickToken, Monetary};
use thiserror::Error;

/// The record family an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Click,
    Transaction,
    Withdrawal
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Validation failed for [{field}]: {reason}")]
    Validation {
        field: &'static str,
        reason: String
    },
    #[error("{entity:?} [{id}] was not found")]
    NotFound {
        entity: Entity,
        id: String
    },
    #[error("{entity:?} [{id}] cannot {action} from state [{state}]")]
    InvalidState {
        entity: Entity,
        id: String,
        action: &'static str,
        state: String
    },
    #[error("Insufficient funds for account [{account_id}]: requested [{requested}], withdrawable [{available}]")]
    InsufficientFunds {
        account_id: AccountId,
        requested: Monetary,
        available: Monetary
    },
    #[error("Conflict on {entity:?} [{id}]: {reason}")]
    Conflict {
        entity: Entity,
        id: String,
        reason: String
    },
    #[error("Storage is currently unavailable")]
    StorageFailure(#[source] StoreError)
}

impl LedgerError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation { field, reason: reason.into() }
    }

    pub fn click_not_found(token: &ClickToken) -> Self {
        Self::NotFound { entity: Entity::Click, id: token.to_string() }
    }

    pub fn transaction_not_found(id: impl ToString) -> Self {
        Self::NotFound { entity: Entity::Transaction, id: id.to_string() }
    }

    pub fn withdrawal_not_found(id: impl ToString) -> Self {
        Self::NotFound { entity: Entity::Withdrawal, id: id.to_string() }
    }

    pub fn invalid_transaction_state(tx: &CashbackTransaction, action: &'static str) -> Self {
        Self::InvalidState {
            entity: Entity::Transaction,
            id: tx.id.to_string(),
            action,
            state: format!("{:?}/{:?}", tx.kind(), tx.status())
        }
    }

    pub fn invalid_withdrawal_state(withdrawal: &WithdrawalRequest, action: &'static str) -> Self {
        Self::InvalidState {
            entity: Entity::Withdrawal,
            id: withdrawal.id.to_string(),
            action,
            state: format!("{:?}", withdrawal.status())
        }
    }

    pub fn insufficient_funds(account_id: &str, requested: Monetary, available: Monetary) -> Self {
        Self::InsufficientFunds { account_id: account_id.to_string(), requested, available }
    }

    pub fn conflict(entity: Entity, id: impl ToString, reason: impl Into<String>) -> Self {
        Self::Conflict { entity, id: id.to_string(), reason: reason.into() }
    }
}

impl From<StoreError> for LedgerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::UniqueViolation { entity, key, index } => {
                Self::conflict(entity, key, format!("unique constraint [{index}] violated"))
            }
            StoreError::GuardFailed { entity, key } => {
                Self::conflict(entity, key, "record was modified concurrently")
            }
            StoreError::Missing { entity, key } => Self::NotFound { entity, id: key },
            unavailable @ StoreError::Unavailable(_) => Self::StorageFailure(unavailable)
        }
    }
}
