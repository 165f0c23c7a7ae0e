use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::errors::{Entity, LedgerError};
use crate::types::{AffiliateId, ClickToken, ProductId, StoreId, UserId};

/// Request details captured when the outbound redirect happens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>
}

/// One outbound referral to a merchant.
///
/// Clicks are never deleted. The only mutation a click ever sees is its
/// conversion, which records the order reference exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Click {
    pub token: ClickToken,
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub affiliate_id: AffiliateId,
    /// Anonymous clicks can convert but never accrue cashback.
    pub user_id: Option<UserId>,
    pub metadata: CaptureMetadata,
    pub created_at: DateTime<Utc>,
    converted: bool,
    order_ref: Option<String>,
    converted_at: Option<DateTime<Utc>>
}

impl Click {
    pub fn new(
        token: ClickToken,
        product_id: ProductId,
        store_id: StoreId,
        affiliate_id: AffiliateId,
        user_id: Option<UserId>,
        metadata: CaptureMetadata,
        created_at: DateTime<Utc>
    ) -> Self {
        Self {
            token,
            product_id,
            store_id,
            affiliate_id,
            user_id,
            metadata,
            created_at,
            converted: false,
            order_ref: None,
            converted_at: None
        }
    }

    pub fn is_converted(&self) -> bool {
        self.converted
    }

    pub fn order_ref(&self) -> Option<&str> {
        self.order_ref.as_deref()
    }

    pub fn converted_at(&self) -> Option<DateTime<Utc>> {
        self.converted_at
    }

    /// Marks the click converted for `order_ref`. A click converts once.
    pub fn convert(&mut self, order_ref: &str, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.converted {
            return Err(LedgerError::conflict(
                Entity::Click,
                &self.token,
                format!("already converted for order [{}]", self.order_ref.as_deref().unwrap_or_default())
            ));
        }

        self.converted = true;
        self.order_ref = Some(order_ref.to_string());
        self.converted_at = Some(now);

        Ok(())
    }
}
