use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonetaryError {
    #[error("Monetary error: {0}")]
    InvalidFormat(String),
    #[error("Monetary error: amount must not be negative")]
    Negative,
    #[error("Monetary error: Overflow")]
    Overflow,
    #[error("Rate error: {0}")]
    InvalidRate(String)
}
