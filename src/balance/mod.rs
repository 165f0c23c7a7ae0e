mod aggregator;

pub use aggregator::{BalanceAggregator, BalanceSummary};
