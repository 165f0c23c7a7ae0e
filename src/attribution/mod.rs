mod tracker;

pub use tracker::{AttributionStats, AttributionTracker, ClickRequest, ConversionOutcome};
