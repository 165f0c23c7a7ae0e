mod click;
mod errors;
#[cfg(test)]
mod tests;
mod transaction;
mod withdrawal;

use serde::{Deserialize, Serialize};

pub use click::{CaptureMetadata, Click};
pub use errors::{Entity, LedgerError};
pub use transaction::{Bucket, CashbackTransaction, TransactionOrigin};
pub use withdrawal::{PayoutMethod, WithdrawalRequest};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// The money-movement category of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Earned,
    Pending,
    Approved,
    Rejected,
    Withdrawn,
    Refunded
}

/// The lifecycle stage of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Rejected
}

/// Which slice of a newest-first listing to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: DEFAULT_PAGE_LIMIT }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Result<Self, LedgerError> {
        if page == 0 {
            return Err(LedgerError::validation("page", "page numbers start at 1"));
        }

        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(LedgerError::validation("limit", format!("limit must be between 1 and {MAX_PAGE_LIMIT}")));
        }

        Ok(Self { page, limit })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: usize
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination
}

impl<T> Page<T> {
    /// Cuts the requested page out of an already ordered listing.
    pub fn slice(items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len();
        let limit = request.limit.max(1) as usize;
        let skip = (request.page as usize).saturating_sub(1).saturating_mul(limit);

        Self {
            items: items.into_iter().skip(skip).take(limit).collect(),
            pagination: Pagination {
                page: request.page,
                limit: request.limit,
                total,
                total_pages: total.div_ceil(limit)
            }
        }
    }
}
