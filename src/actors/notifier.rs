use std::future::Future;

use tracing::info;

use crate::types::{Monetary, TransactionId, UserId, WithdrawalId};

/// Ledger lifecycle changes that users are told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    TransactionApproved {
        transaction_id: TransactionId,
        user_id: UserId,
        amount: Monetary
    },
    TransactionRejected {
        transaction_id: TransactionId,
        user_id: UserId,
        reason: String
    },
    WithdrawalCompleted {
        withdrawal_id: WithdrawalId,
        user_id: UserId,
        net_amount: Monetary,
        external_ref: String
    },
    WithdrawalRejected {
        withdrawal_id: WithdrawalId,
        user_id: UserId,
        reason: String
    }
}

/// Outbound channel for lifecycle events (email, push, ...).
///
/// Delivery failures are reported back as errors but never undo ledger state.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, event: &LifecycleEvent) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        info!("Lifecycle event: {event:?}");
        Ok(())
    }
}
