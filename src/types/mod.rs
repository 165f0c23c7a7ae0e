mod errors;
mod monetary;

use std::fmt;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::LedgerError;

pub use errors::MonetaryError;
pub use monetary::{Monetary, Rate};

pub type UserId = String;
pub type AccountId = String;
pub type ProductId = String;
pub type StoreId = String;
pub type AffiliateId = String;
pub type TransactionId = Uuid;
pub type WithdrawalId = Uuid;

const CLICK_TOKEN_LENGTH: usize = 32;

/// Opaque identifier handed out for every outbound click.
///
/// 32 alphanumeric characters from the thread-local CSPRNG, roughly 190 bits of entropy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClickToken(String);

impl ClickToken {
    pub fn generate() -> Self {
        let token = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CLICK_TOKEN_LENGTH)
            .map(char::from)
            .collect();

        ClickToken(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClickToken {
    fn from(value: &str) -> Self {
        ClickToken(value.to_string())
    }
}

impl Display for ClickToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Inclusive window of creation times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, LedgerError> {
        if start > end {
            return Err(LedgerError::validation("range", format!("start [{start}] is after end [{end}]")));
        }

        Ok(Self { start, end })
    }

    /// The window ending now and reaching back `days` days.
    pub fn last_days(days: u32) -> Self {
        let end = Utc::now();
        let start = end.checked_sub_signed(Duration::days(i64::from(days))).unwrap_or(DateTime::<Utc>::MIN_UTC);

        Self { start, end }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}
