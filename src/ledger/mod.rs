mod account_locks;
mod transaction_ledger;

pub use account_locks::{AccountGuard, AccountLocks};
pub use transaction_ledger::{Ledger, TransactionQuery};
