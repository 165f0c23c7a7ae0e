use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;

use crate::models::{CashbackTransaction, Click, Entity, WithdrawalRequest};
use crate::storage::{Store, StoreError, TransactionFilter, WithdrawalFilter, Write, WriteBatch};
use crate::types::{ClickToken, DateRange, TransactionId, WithdrawalId};

const CLICKS_PKEY: &str = "clicks_pkey";
const TRANSACTIONS_PKEY: &str = "transactions_pkey";
const TRANSACTIONS_CLICK_KEY: &str = "transactions_click_token_key";
const TRANSACTIONS_WITHDRAWAL_KEY: &str = "transactions_withdrawal_id_key";
const WITHDRAWALS_PKEY: &str = "withdrawals_pkey";

/// In-process [`Store`] backed by concurrent maps.
///
/// Point and list reads share the gate; a batch holds it exclusively while
/// it is validated and committed, so readers see either none or all of it.
pub struct MemoryStore {
    clicks: DashMap<ClickToken, Click>,
    transactions: DashMap<TransactionId, CashbackTransaction>,
    withdrawals: DashMap<WithdrawalId, WithdrawalRequest>,
    conversions: DashMap<ClickToken, TransactionId>,
    payouts: DashMap<WithdrawalId, TransactionId>,
    gate: RwLock<()>
}

/// Keys claimed by earlier writes of the batch being validated.
#[derive(Default)]
struct Staged {
    clicks: HashSet<ClickToken>,
    converted: HashSet<ClickToken>,
    transactions: HashSet<TransactionId>,
    conversions: HashSet<ClickToken>,
    payouts: HashSet<WithdrawalId>,
    withdrawals: HashSet<WithdrawalId>
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            clicks: DashMap::new(),
            transactions: DashMap::new(),
            withdrawals: DashMap::new(),
            conversions: DashMap::new(),
            payouts: DashMap::new(),
            gate: RwLock::new(())
        }
    }

    fn read_gate(&self) -> Result<RwLockReadGuard<'_, ()>, StoreError> {
        self.gate.read().map_err(|_| StoreError::Unavailable("store gate poisoned".to_string()))
    }

    fn write_gate(&self) -> Result<RwLockWriteGuard<'_, ()>, StoreError> {
        self.gate.write().map_err(|_| StoreError::Unavailable("store gate poisoned".to_string()))
    }

    fn validate(&self, write: &Write, staged: &mut Staged) -> Result<(), StoreError> {
        match write {
            Write::InsertClick(click) => {
                if self.clicks.contains_key(&click.token) || !staged.clicks.insert(click.token.clone()) {
                    return Err(unique(Entity::Click, CLICKS_PKEY, &click.token));
                }
            }
            Write::ConvertClick(click) => {
                let stored = self.clicks.get(&click.token).ok_or_else(|| missing(Entity::Click, &click.token))?;

                if stored.is_converted() || !staged.converted.insert(click.token.clone()) {
                    return Err(guard_failed(Entity::Click, &click.token));
                }
            }
            Write::InsertTransaction(transaction) => {
                if self.transactions.contains_key(&transaction.id) || !staged.transactions.insert(transaction.id) {
                    return Err(unique(Entity::Transaction, TRANSACTIONS_PKEY, transaction.id));
                }

                if let Some(token) = transaction.click_token() {
                    if self.conversions.contains_key(token) || !staged.conversions.insert(token.clone()) {
                        return Err(unique(Entity::Transaction, TRANSACTIONS_CLICK_KEY, token));
                    }
                }

                if let Some(withdrawal_id) = transaction.withdrawal_id() {
                    if self.payouts.contains_key(&withdrawal_id) || !staged.payouts.insert(withdrawal_id) {
                        return Err(unique(Entity::Transaction, TRANSACTIONS_WITHDRAWAL_KEY, withdrawal_id));
                    }
                }
            }
            Write::UpdateTransaction { expected, transaction } => {
                let stored = self.transactions.get(&transaction.id)
                    .ok_or_else(|| missing(Entity::Transaction, transaction.id))?;

                if (stored.kind(), stored.status()) != *expected || stored.amount() != transaction.amount() {
                    return Err(guard_failed(Entity::Transaction, transaction.id));
                }
            }
            Write::InsertWithdrawal(withdrawal) => {
                if self.withdrawals.contains_key(&withdrawal.id) || !staged.withdrawals.insert(withdrawal.id) {
                    return Err(unique(Entity::Withdrawal, WITHDRAWALS_PKEY, withdrawal.id));
                }
            }
            Write::UpdateWithdrawal { expected, withdrawal } => {
                let stored = self.withdrawals.get(&withdrawal.id)
                    .ok_or_else(|| missing(Entity::Withdrawal, withdrawal.id))?;

                if stored.status() != *expected
                    || stored.amount() != withdrawal.amount()
                    || stored.net_amount() != withdrawal.net_amount()
                {
                    return Err(guard_failed(Entity::Withdrawal, withdrawal.id));
                }
            }
        }

        Ok(())
    }

    fn commit(&self, write: Write) {
        match write {
            Write::InsertClick(click) | Write::ConvertClick(click) => {
                self.clicks.insert(click.token.clone(), click);
            }
            Write::InsertTransaction(transaction) => {
                if let Some(token) = transaction.click_token() {
                    self.conversions.insert(token.clone(), transaction.id);
                }

                if let Some(withdrawal_id) = transaction.withdrawal_id() {
                    self.payouts.insert(withdrawal_id, transaction.id);
                }

                self.transactions.insert(transaction.id, transaction);
            }
            Write::UpdateTransaction { transaction, .. } => {
                self.transactions.insert(transaction.id, transaction);
            }
            Write::InsertWithdrawal(withdrawal) | Write::UpdateWithdrawal { withdrawal, .. } => {
                self.withdrawals.insert(withdrawal.id, withdrawal);
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn click(&self, token: &ClickToken) -> Result<Option<Click>, StoreError> {
        let _gate = self.read_gate()?;
        Ok(self.clicks.get(token).map(|click| click.value().clone()))
    }

    fn clicks_for_user(&self, user_id: &str, range: &DateRange) -> Result<Vec<Click>, StoreError> {
        let _gate = self.read_gate()?;

        let mut clicks: Vec<Click> = self.clicks.iter()
            .filter(|click| click.user_id.as_deref() == Some(user_id) && range.contains(click.created_at))
            .map(|click| click.value().clone())
            .collect();

        clicks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.token.cmp(&b.token)));

        Ok(clicks)
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<CashbackTransaction>, StoreError> {
        let _gate = self.read_gate()?;
        Ok(self.transactions.get(&id).map(|transaction| transaction.value().clone()))
    }

    fn transaction_for_click(&self, token: &ClickToken) -> Result<Option<CashbackTransaction>, StoreError> {
        let _gate = self.read_gate()?;

        let Some(id) = self.conversions.get(token).map(|id| *id.value()) else {
            return Ok(None);
        };

        Ok(self.transactions.get(&id).map(|transaction| transaction.value().clone()))
    }

    fn transaction_for_withdrawal(&self, id: WithdrawalId) -> Result<Option<CashbackTransaction>, StoreError> {
        let _gate = self.read_gate()?;

        let Some(transaction_id) = self.payouts.get(&id).map(|id| *id.value()) else {
            return Ok(None);
        };

        Ok(self.transactions.get(&transaction_id).map(|transaction| transaction.value().clone()))
    }

    fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<CashbackTransaction>, StoreError> {
        let _gate = self.read_gate()?;

        let mut transactions: Vec<CashbackTransaction> = self.transactions.iter()
            .filter(|transaction| filter.matches(transaction.value()))
            .map(|transaction| transaction.value().clone())
            .collect();

        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(transactions)
    }

    fn withdrawal(&self, id: WithdrawalId) -> Result<Option<WithdrawalRequest>, StoreError> {
        let _gate = self.read_gate()?;
        Ok(self.withdrawals.get(&id).map(|withdrawal| withdrawal.value().clone()))
    }

    fn withdrawals(&self, filter: &WithdrawalFilter) -> Result<Vec<WithdrawalRequest>, StoreError> {
        let _gate = self.read_gate()?;

        let mut withdrawals: Vec<WithdrawalRequest> = self.withdrawals.iter()
            .filter(|withdrawal| filter.matches(withdrawal.value()))
            .map(|withdrawal| withdrawal.value().clone())
            .collect();

        withdrawals.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(withdrawals)
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let _gate = self.write_gate()?;
        let mut staged = Staged::default();

        for write in batch.writes() {
            self.validate(write, &mut staged)?;
        }

        for write in batch.into_writes() {
            self.commit(write);
        }

        Ok(())
    }
}

fn unique(entity: Entity, index: &'static str, key: impl ToString) -> StoreError {
    StoreError::UniqueViolation { entity, index, key: key.to_string() }
}

fn guard_failed(entity: Entity, key: impl ToString) -> StoreError {
    StoreError::GuardFailed { entity, key: key.to_string() }
}

fn missing(entity: Entity, key: impl ToString) -> StoreError {
    StoreError::Missing { entity, key: key.to_string() }
}
