use super::{Bucket, CaptureMetadata, CashbackTransaction, Click, Page, PageRequest, PayoutMethod, TransactionKind, TransactionOrigin, TransactionStatus, WithdrawalRequest, WithdrawalStatus};

use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;

use crate::models::errors::LedgerError;
use crate::types::{ClickToken, Monetary, Rate};

fn create_pending(amount: &str) -> Result<CashbackTransaction> {
    let origin = TransactionOrigin::Administrative { description: "manual entry".to_string() };
    Ok(CashbackTransaction::open("alice".to_string(), "alice".to_string(), Monetary::from_str(amount)?, origin, Utc::now()))
}

fn create_withdrawal(amount: &str, fee_rate: &str) -> Result<WithdrawalRequest> {
    Ok(WithdrawalRequest::new(
        "alice".to_string(),
        "alice".to_string(),
        Monetary::from_str(amount)?,
        Rate::from_str(fee_rate)?,
        PayoutMethod::new("bank_transfer"),
        Utc::now()
    )?)
}

#[test]
fn test_opened_transaction_is_pending_and_non_terminal() -> Result<()> {
    let transaction = create_pending("25.00")?;

    assert_eq!(transaction.kind(), TransactionKind::Pending);
    assert_eq!(transaction.status(), TransactionStatus::Pending);
    assert_eq!(transaction.bucket(), Some(Bucket::Pending));
    assert!(!transaction.is_terminal());

    Ok(())
}

#[test]
fn test_approve_moves_to_approved_completed_and_stamps_time() -> Result<()> {
    let mut transaction = create_pending("25.00")?;
    transaction.approve(Utc::now())?;

    assert_eq!(transaction.kind(), TransactionKind::Approved);
    assert_eq!(transaction.status(), TransactionStatus::Completed);
    assert_eq!(transaction.bucket(), Some(Bucket::Approved));
    assert!(transaction.approved_at().is_some());
    assert_eq!(transaction.amount(), Monetary::from_str("25.00")?);

    Ok(())
}

#[test]
fn test_terminal_transactions_refuse_further_transitions() -> Result<()> {
    let mut approved = create_pending("25.00")?;
    approved.approve(Utc::now())?;

    assert!(matches!(approved.approve(Utc::now()), Err(LedgerError::InvalidState { .. })));
    assert!(matches!(approved.reject("late", Utc::now()), Err(LedgerError::InvalidState { .. })));

    let mut rejected = create_pending("25.00")?;
    rejected.reject("order cancelled", Utc::now())?;

    assert_eq!(rejected.kind(), TransactionKind::Rejected);
    assert_eq!(rejected.status(), TransactionStatus::Failed);
    assert_eq!(rejected.rejection_reason(), Some("order cancelled"));
    assert_eq!(rejected.bucket(), None);
    assert!(matches!(rejected.approve(Utc::now()), Err(LedgerError::InvalidState { .. })));

    let mut credit = CashbackTransaction::credit("alice".to_string(), "alice".to_string(), Monetary::from_str("5.00")?, "bonus".to_string(), Utc::now());

    assert_eq!(credit.bucket(), Some(Bucket::Earned));
    assert!(matches!(credit.approve(Utc::now()), Err(LedgerError::InvalidState { .. })));

    Ok(())
}

#[test]
fn test_reject_requires_a_reason() -> Result<()> {
    let mut transaction = create_pending("25.00")?;
    let result = transaction.reject("   ", Utc::now());

    assert!(matches!(result, Err(LedgerError::Validation { field: "reason", .. })));
    assert!(!transaction.is_terminal());

    Ok(())
}

#[test]
fn test_click_converts_exactly_once() -> Result<()> {
    let mut click = Click::new(
        ClickToken::generate(),
        "product-1".to_string(),
        "store-1".to_string(),
        "affiliate-1".to_string(),
        None,
        CaptureMetadata::default(),
        Utc::now()
    );

    assert!(!click.is_converted());

    click.convert("order-100", Utc::now())?;

    assert!(click.is_converted());
    assert_eq!(click.order_ref(), Some("order-100"));
    assert!(matches!(click.convert("order-200", Utc::now()), Err(LedgerError::Conflict { .. })));
    assert_eq!(click.order_ref(), Some("order-100"));

    Ok(())
}

#[test]
fn test_withdrawal_fixes_fee_and_net_amount_at_creation() -> Result<()> {
    let withdrawal = create_withdrawal("50.00", "2")?;

    assert_eq!(withdrawal.fee(), Monetary::from_str("1.00")?);
    assert_eq!(withdrawal.net_amount(), Monetary::from_str("49.00")?);
    assert_eq!(withdrawal.fee_rate(), Rate::from_str("2")?);
    assert_eq!(withdrawal.status(), WithdrawalStatus::Pending);
    assert!(withdrawal.is_open());

    Ok(())
}

#[test]
fn test_withdrawal_lifecycle_only_moves_forward() -> Result<()> {
    let mut withdrawal = create_withdrawal("50.00", "0")?;

    assert!(matches!(withdrawal.complete("TX-1", Utc::now()), Err(LedgerError::InvalidState { .. })));

    withdrawal.process(Utc::now())?;
    assert!(matches!(withdrawal.process(Utc::now()), Err(LedgerError::InvalidState { .. })));

    withdrawal.complete("TX-1", Utc::now())?;

    assert_eq!(withdrawal.status(), WithdrawalStatus::Completed);
    assert_eq!(withdrawal.external_ref(), Some("TX-1"));
    assert!(!withdrawal.is_open());
    assert!(matches!(withdrawal.reject("too late", Utc::now()), Err(LedgerError::InvalidState { .. })));

    Ok(())
}

#[test]
fn test_withdrawal_can_be_rejected_while_processing() -> Result<()> {
    let mut withdrawal = create_withdrawal("50.00", "0")?;
    withdrawal.process(Utc::now())?;

    assert!(matches!(withdrawal.reject("", Utc::now()), Err(LedgerError::Validation { .. })));

    withdrawal.reject("iban invalid", Utc::now())?;

    assert_eq!(withdrawal.status(), WithdrawalStatus::Rejected);
    assert_eq!(withdrawal.rejection_reason(), Some("iban invalid"));

    Ok(())
}

#[test]
fn test_page_slices_listing_and_counts_pages() -> Result<()> {
    let items: Vec<u32> = (1..=45).collect();
    let page = Page::slice(items, PageRequest::new(3, 20)?);

    assert_eq!(page.items, (41..=45).collect::<Vec<_>>());
    assert_eq!(page.pagination.total, 45);
    assert_eq!(page.pagination.total_pages, 3);

    assert!(PageRequest::new(0, 20).is_err());
    assert!(PageRequest::new(1, 101).is_err());

    Ok(())
}
