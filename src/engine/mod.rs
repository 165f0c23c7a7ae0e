mod cashback_engine;
mod replay;
#[cfg(test)]
mod tests;

pub use cashback_engine::CashbackEngine;
pub use replay::{write_summaries, FeedOp, FeedRecord, Replay, ReplayReport};
