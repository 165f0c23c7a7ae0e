use std::sync::Arc;

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::ledger::Ledger;
use crate::models::{CaptureMetadata, CashbackTransaction, Click, Entity, LedgerError, TransactionKind, TransactionOrigin};
use crate::storage::{Store, TransactionFilter, WriteBatch};
use crate::types::{AffiliateId, ClickToken, DateRange, Monetary, ProductId, Rate, StoreId, UserId};

/// An outbound redirect to record.
#[derive(Debug, Clone, Default)]
pub struct ClickRequest {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub affiliate_id: AffiliateId,
    pub user_id: Option<UserId>,
    pub metadata: CaptureMetadata
}

/// Result of reporting a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    /// Zero for anonymous clicks.
    pub cashback_amount: Monetary,
    /// The PENDING entry opened for the click owner, if any.
    pub transaction: Option<CashbackTransaction>,
    /// Set when the conversion had already been recorded and nothing was written.
    pub replayed: bool
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributionStats {
    pub total_clicks: u64,
    pub total_conversions: u64,
    /// Percentage of clicks that converted, 2 decimals.
    pub conversion_rate: Decimal,
    /// PENDING and APPROVED cashback created in the window.
    pub total_earned: Monetary
}

/// Records clicks and turns reported purchases into pending cashback.
pub struct AttributionTracker<S: Store> {
    store: Arc<S>,
    ledger: Arc<Ledger<S>>,
    commission_rate: RwLock<Rate>,
    stats_window_days: u32
}

impl<S: Store> AttributionTracker<S> {
    pub fn new(store: Arc<S>, ledger: Arc<Ledger<S>>, commission_rate: Rate, stats_window_days: u32) -> Self {
        Self {
            store,
            ledger,
            commission_rate: RwLock::new(commission_rate),
            stats_window_days
        }
    }

    /// Changes the rate snapshotted by conversions reported from now on.
    pub async fn set_commission_rate(&self, commission_rate: Rate) {
        *self.commission_rate.write().await = commission_rate;
    }

    pub async fn commission_rate(&self) -> Rate {
        *self.commission_rate.read().await
    }

    /// Persists a click under a freshly generated token.
    pub fn track_click(&self, request: ClickRequest) -> Result<ClickToken, LedgerError> {
        let click = Click::new(
            ClickToken::generate(),
            request.product_id,
            request.store_id,
            request.affiliate_id,
            request.user_id,
            request.metadata,
            Utc::now()
        );

        let token = click.token.clone();
        let mut batch = WriteBatch::default();
        batch.insert_click(click);
        self.store.apply(batch)?;

        debug!("Click [{token}] tracked");

        Ok(token)
    }

    /// Marks the click converted and, for owned clicks, opens a PENDING
    /// cashback entry in the same atomic batch.
    ///
    /// A repeated report for the same order returns the first outcome. A
    /// report for a different order on an already converted click is a
    /// [`LedgerError::Conflict`].
    pub async fn track_conversion(
        &self,
        token: &ClickToken,
        order_ref: &str,
        gross_amount: Monetary
    ) -> Result<ConversionOutcome, LedgerError> {
        let order_ref = order_ref.trim();

        if order_ref.is_empty() {
            return Err(LedgerError::validation("order_ref", "an order reference is required"));
        }

        let mut click = self.click(token)?;

        if click.is_converted() {
            return self.replay(&click, order_ref);
        }

        click.convert(order_ref, Utc::now())?;

        let mut batch = WriteBatch::default();
        batch.convert_click(click.clone());

        let Some(user_id) = click.user_id.clone() else {
            //NOTE: Anonymous clicks are kept for audit but never accrue cashback
            return match self.store.apply(batch) {
                Ok(()) => {
                    debug!("Anonymous click [{token}] converted for order [{order_ref}], no cashback");
                    Ok(ConversionOutcome { cashback_amount: Monetary::ZERO, transaction: None, replayed: false })
                },
                Err(error) => self.resolve_race(token, order_ref, error.into())
            };
        };

        let commission_rate = self.commission_rate().await;
        let cashback_amount = gross_amount.percent(commission_rate)
            .map_err(|error| LedgerError::validation("gross_amount", error.to_string()))?;

        let origin = TransactionOrigin::Conversion {
            click_token: token.clone(),
            order_ref: order_ref.to_string(),
            order_amount: gross_amount,
            store_id: click.store_id.clone(),
            product_id: click.product_id.clone(),
            affiliate_id: click.affiliate_id.clone(),
            commission_rate
        };

        match self.ledger.open_with(batch, user_id.clone(), user_id, cashback_amount, origin).await {
            Ok(transaction) => {
                debug!("Click [{token}] converted for order [{order_ref}]: [{gross_amount}] at [{commission_rate}] earns [{cashback_amount}]");
                Ok(ConversionOutcome { cashback_amount, transaction: Some(transaction), replayed: false })
            },
            Err(error) => self.resolve_race(token, order_ref, error)
        }
    }

    /// Clicks, conversions and cashback for a user over `range`, or the
    /// default trailing window when no range is given.
    pub fn attribution_stats(&self, user_id: &str, range: Option<DateRange>) -> Result<AttributionStats, LedgerError> {
        let range = range.unwrap_or_else(|| DateRange::last_days(self.stats_window_days));

        let clicks = self.store.clicks_for_user(user_id, &range)?;
        let total_clicks = clicks.len() as u64;
        let total_conversions = clicks.iter().filter(|click| click.is_converted()).count() as u64;

        let conversion_rate = if total_clicks == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(total_conversions) * Decimal::ONE_HUNDRED / Decimal::from(total_clicks))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        };

        let filter = TransactionFilter {
            user_id: Some(user_id.to_string()),
            created: Some(range),
            ..TransactionFilter::default()
        };

        let total_earned = self.store.transactions(&filter)?
            .iter()
            .filter(|transaction| matches!(transaction.kind(), TransactionKind::Pending | TransactionKind::Approved))
            .map(|transaction| transaction.amount())
            .sum();

        Ok(AttributionStats { total_clicks, total_conversions, conversion_rate, total_earned })
    }

    pub fn click(&self, token: &ClickToken) -> Result<Click, LedgerError> {
        self.store.click(token)?.ok_or_else(|| LedgerError::click_not_found(token))
    }

    /// A concurrent report may have converted the click between our read
    /// and our write. The store's guards reject the second writer, which
    /// then resolves as a replay of whatever won.
    fn resolve_race(&self, token: &ClickToken, order_ref: &str, error: LedgerError) -> Result<ConversionOutcome, LedgerError> {
        if !matches!(error, LedgerError::Conflict { .. }) {
            return Err(error);
        }

        let click = self.click(token)?;

        if !click.is_converted() {
            return Err(error);
        }

        self.replay(&click, order_ref)
    }

    fn replay(&self, click: &Click, order_ref: &str) -> Result<ConversionOutcome, LedgerError> {
        if click.order_ref() != Some(order_ref) {
            let error = LedgerError::conflict(
                Entity::Click,
                &click.token,
                format!("already converted for order [{}]", click.order_ref().unwrap_or_default())
            );
            warn!("{error}");
            return Err(error);
        }

        let transaction = self.store.transaction_for_click(&click.token)?;
        let cashback_amount = transaction.as_ref().map_or(Monetary::ZERO, |transaction| transaction.amount());

        debug!("Conversion of click [{}] for order [{order_ref}] replayed", click.token);

        Ok(ConversionOutcome { cashback_amount, transaction, replayed: true })
    }
}
