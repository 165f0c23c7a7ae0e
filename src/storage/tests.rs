use super::{MemoryStore, Store, StoreError, TransactionFilter, WithdrawalFilter, WriteBatch};
use crate::models::{CaptureMetadata, CashbackTransaction, Click, PayoutMethod, TransactionKind, TransactionOrigin, TransactionStatus, WithdrawalRequest, WithdrawalStatus};
use crate::types::{ClickToken, DateRange, Monetary, Rate};
use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use std::str::FromStr;

fn create_click(user_id: Option<&str>) -> Click {
    Click::new(
        ClickToken::generate(),
        "product-1".to_string(),
        "store-1".to_string(),
        "affiliate-1".to_string(),
        user_id.map(str::to_string),
        CaptureMetadata::default(),
        Utc::now()
    )
}

fn create_conversion(click: &Click, amount: &str) -> Result<CashbackTransaction> {
    let origin = TransactionOrigin::Conversion {
        click_token: click.token.clone(),
        order_ref: "order-1".to_string(),
        order_amount: Monetary::from_str("100.00")?,
        store_id: click.store_id.clone(),
        product_id: click.product_id.clone(),
        affiliate_id: click.affiliate_id.clone(),
        commission_rate: Rate::from_str("2.5")?
    };

    Ok(CashbackTransaction::open("alice".to_string(), "alice".to_string(), Monetary::from_str(amount)?, origin, Utc::now()))
}

#[test]
fn test_storage_basic_insert_and_load_operations() -> Result<()> {
    let store = MemoryStore::new();
    let click = create_click(Some("alice"));

    assert!(store.click(&click.token)?.is_none());

    let mut batch = WriteBatch::default();
    batch.insert_click(click.clone());
    store.apply(batch)?;

    let retrieved = store.click(&click.token)?.ok_or_else(|| anyhow!("Click not found in storage"))?;

    assert_eq!(retrieved, click);

    Ok(())
}

#[test]
fn test_storage_rejects_duplicate_click_tokens() -> Result<()> {
    let store = MemoryStore::new();
    let click = create_click(None);

    let mut batch = WriteBatch::default();
    batch.insert_click(click.clone());
    store.apply(batch)?;

    let mut duplicate = WriteBatch::default();
    duplicate.insert_click(click);

    assert!(matches!(store.apply(duplicate), Err(StoreError::UniqueViolation { .. })));

    Ok(())
}

#[test]
fn test_storage_converts_a_click_only_once() -> Result<()> {
    let store = MemoryStore::new();
    let mut click = create_click(Some("alice"));

    let mut batch = WriteBatch::default();
    batch.insert_click(click.clone());
    store.apply(batch)?;

    click.convert("order-1", Utc::now())?;

    let mut first = WriteBatch::default();
    first.convert_click(click.clone());
    store.apply(first)?;

    let mut second = WriteBatch::default();
    second.convert_click(click.clone());

    assert!(matches!(store.apply(second), Err(StoreError::GuardFailed { .. })));

    Ok(())
}

#[test]
fn test_storage_failed_batch_leaves_no_partial_state() -> Result<()> {
    let store = MemoryStore::new();
    let mut click = create_click(Some("alice"));

    let mut setup = WriteBatch::default();
    setup.insert_click(click.clone());
    store.apply(setup)?;

    let first = create_conversion(&click, "2.50")?;
    let mut conversion = WriteBatch::default();
    conversion.insert_transaction(first);
    store.apply(conversion)?;

    //NOTE: The click update is valid on its own, the second conversion entry is not
    click.convert("order-1", Utc::now())?;
    let mut batch = WriteBatch::default();
    batch.convert_click(click.clone());
    batch.insert_transaction(create_conversion(&click, "2.50")?);

    assert!(matches!(store.apply(batch), Err(StoreError::UniqueViolation { .. })));

    let stored = store.click(&click.token)?.ok_or_else(|| anyhow!("Click missing"))?;

    assert!(!stored.is_converted());
    assert_eq!(store.transactions(&TransactionFilter::default())?.len(), 1);

    Ok(())
}

#[test]
fn test_storage_update_guard_rejects_stale_transaction_state() -> Result<()> {
    let store = MemoryStore::new();
    let click = create_click(Some("alice"));
    let transaction = create_conversion(&click, "2.50")?;

    let mut batch = WriteBatch::default();
    batch.insert_transaction(transaction.clone());
    store.apply(batch)?;

    let mut approved = transaction.clone();
    approved.approve(Utc::now())?;

    let mut first = WriteBatch::default();
    first.update_transaction((TransactionKind::Pending, TransactionStatus::Pending), approved.clone());
    store.apply(first)?;

    let mut replayed = WriteBatch::default();
    replayed.update_transaction((TransactionKind::Pending, TransactionStatus::Pending), approved);

    assert!(matches!(store.apply(replayed), Err(StoreError::GuardFailed { .. })));

    Ok(())
}

#[test]
fn test_storage_filters_and_orders_newest_first() -> Result<()> {
    let store = MemoryStore::new();
    let now = Utc::now();

    let older = CashbackTransaction::credit("alice".to_string(), "alice".to_string(), Monetary::from_str("1.00")?, "bonus".to_string(), now - Duration::hours(2));
    let newer = CashbackTransaction::credit("alice".to_string(), "alice".to_string(), Monetary::from_str("2.00")?, "bonus".to_string(), now);
    let other = CashbackTransaction::credit("bob".to_string(), "bob".to_string(), Monetary::from_str("3.00")?, "bonus".to_string(), now);

    let mut batch = WriteBatch::default();
    batch.insert_transaction(older.clone()).insert_transaction(newer.clone()).insert_transaction(other);
    store.apply(batch)?;

    let filter = TransactionFilter { user_id: Some("alice".to_string()), ..TransactionFilter::default() };
    let listed = store.transactions(&filter)?;

    assert_eq!(listed, vec![newer.clone(), older]);

    let recent = TransactionFilter {
        user_id: Some("alice".to_string()),
        created: Some(DateRange::new(now - Duration::hours(1), now)?),
        ..TransactionFilter::default()
    };

    assert_eq!(store.transactions(&recent)?, vec![newer]);

    Ok(())
}

#[test]
fn test_storage_withdrawal_update_guard_and_unique_payout() -> Result<()> {
    let store = MemoryStore::new();
    let withdrawal = WithdrawalRequest::new(
        "alice".to_string(),
        "alice".to_string(),
        Monetary::from_str("50.00")?,
        Rate::from_str("2")?,
        PayoutMethod::new("bank_transfer"),
        Utc::now()
    )?;

    let mut batch = WriteBatch::default();
    batch.insert_withdrawal(withdrawal.clone());
    store.apply(batch)?;

    let mut processing = withdrawal.clone();
    processing.process(Utc::now())?;

    let mut stale = WriteBatch::default();
    stale.update_withdrawal(WithdrawalStatus::Processing, processing.clone());
    assert!(matches!(store.apply(stale), Err(StoreError::GuardFailed { .. })));

    let mut update = WriteBatch::default();
    update.update_withdrawal(WithdrawalStatus::Pending, processing);
    store.apply(update)?;

    let payout = CashbackTransaction::withdrawn("alice".to_string(), "alice".to_string(), withdrawal.net_amount(), withdrawal.id, "TX-1".to_string(), Utc::now());
    let second = CashbackTransaction::withdrawn("alice".to_string(), "alice".to_string(), withdrawal.net_amount(), withdrawal.id, "TX-1".to_string(), Utc::now());

    let mut payouts = WriteBatch::default();
    payouts.insert_transaction(payout.clone());
    store.apply(payouts)?;

    let mut duplicate = WriteBatch::default();
    duplicate.insert_transaction(second);
    assert!(matches!(store.apply(duplicate), Err(StoreError::UniqueViolation { .. })));

    assert_eq!(store.transaction_for_withdrawal(withdrawal.id)?, Some(payout));

    let filter = WithdrawalFilter { status: Some(WithdrawalStatus::Processing), ..WithdrawalFilter::default() };
    assert_eq!(store.withdrawals(&filter)?.len(), 1);

    Ok(())
}
