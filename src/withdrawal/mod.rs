mod processor;

pub use processor::{CompletedWithdrawal, NewWithdrawal, WithdrawalProcessor, WithdrawalQuery};
