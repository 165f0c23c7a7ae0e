use super::{write_summaries, CashbackEngine, Replay};

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::time::sleep;

use crate::actors::LogNotifier;
use crate::config::Config;
use crate::models::{CashbackTransaction, TransactionKind, WithdrawalStatus};
use crate::storage::{MemoryStore, Store, TransactionFilter, WithdrawalFilter, WriteBatch};
use crate::types::{Monetary, Rate};

const HEADER: &str = "op,ref,user,product,store,affiliate,amount,detail";

fn create_temporary_csv(rows: &[&str]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;

    writeln!(file, "{HEADER}")?;

    for row in rows {
        writeln!(file, "{row}")?;
    }

    Ok(file)
}

fn create_engine(config: &Config) -> CashbackEngine<MemoryStore> {
    CashbackEngine::new(Arc::new(MemoryStore::new()), config, Arc::new(LogNotifier))
}

fn path(file: &NamedTempFile) -> Result<String> {
    file.path().to_str().map(str::to_string).ok_or_else(|| anyhow!("temporary path is not utf-8"))
}

#[tokio::test]
async fn test_replay_runs_full_cashback_lifecycle() -> Result<()> {
    let engine = create_engine(&Config { withdrawal_fee_rate: Rate::from_str("2")?, ..Config::default() });

    let file = create_temporary_csv(&[
        "click,ck1,alice,laptop,store-1,awin,,",
        "conversion,ck1,,,,,4000.00,order-100",
        "approve,order-100,,,,,,",
        "withdraw,w1,alice,,,,50.00,paypal",
        "process,w1,,,,,,",
        "complete,w1,,,,,,TX-REF-1"
    ])?;

    let report = Replay::new(&engine).run(&path(&file)?).await?;

    assert_eq!(report.applied, 6);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.accounts.iter().collect::<Vec<_>>(), vec!["alice"]);

    let summary = engine.balances().summary("alice").await?;

    assert_eq!(summary.total_approved, Monetary::from_str("100.00")?);
    assert_eq!(summary.total_withdrawn, Monetary::from_str("49.00")?);
    assert_eq!(summary.available_balance, Monetary::from_str("51.00")?);

    let withdrawals = engine.store().withdrawals(&WithdrawalFilter::default())?;

    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].status(), WithdrawalStatus::Completed);

    engine.shutdown().await?;

    Ok(())
}

#[tokio::test]
async fn test_replay_skips_malformed_and_refused_rows() -> Result<()> {
    let engine = create_engine(&Config::default());

    let file = create_temporary_csv(&[
        "credit,c1,bob,,,,80.00,signup bonus",
        "explode,x,bob,,,,1.00,",
        "credit,c2,bob,,,,not-money,oops",
        "withdraw,w1,bob,,,,500.00,",
        "approve,order-404,,,,,,",
        "conversion,unknown-click,,,,,10.00,order-1",
        "withdraw,w2,bob,,,,60.00,"
    ])?;

    let report = Replay::new(&engine).run(&path(&file)?).await?;

    assert_eq!(report.applied, 2);
    assert_eq!(report.skipped, 5);

    let summary = engine.balances().summary("bob").await?;

    assert_eq!(summary.available_balance, Monetary::from_str("80.00")?);
    assert_eq!(summary.reserved, Monetary::from_str("60.00")?);

    Ok(())
}

#[tokio::test]
async fn test_replay_handles_missing_csv_file_without_error() -> Result<()> {
    let engine = create_engine(&Config::default());
    let report = Replay::new(&engine).run("missing.csv").await?;

    assert_eq!(report.applied, 0);
    assert!(report.accounts.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_replay_keeps_anonymous_and_rejected_conversions_out_of_balances() -> Result<()> {
    let engine = create_engine(&Config::default());

    let file = create_temporary_csv(&[
        "click,anon,,tv,store-2,cj,,",
        "conversion,anon,,,,,999.00,order-1",
        "click,ck2,carol,tv,store-2,cj,,",
        "conversion,ck2,,,,,200.00,order-2",
        "conversion,ck2,,,,,200.00,order-2",
        "reject,order-2,,,,,,returned"
    ])?;

    let report = Replay::new(&engine).run(&path(&file)?).await?;

    assert_eq!(report.skipped, 0);
    assert_eq!(report.accounts.iter().collect::<Vec<_>>(), vec!["carol"]);

    let rejected = engine.store().transactions(&TransactionFilter {
        kind: Some(TransactionKind::Rejected),
        ..TransactionFilter::default()
    })?;

    assert_eq!(rejected.len(), 1);
    assert_eq!(engine.store().transactions(&TransactionFilter::default())?.len(), 1);
    assert_eq!(engine.balances().summary("carol").await?.available_balance, Monetary::ZERO);

    Ok(())
}

#[tokio::test]
async fn test_summaries_are_written_as_csv_rows() -> Result<()> {
    let engine = create_engine(&Config::default());

    let file = create_temporary_csv(&[
        "credit,c1,zoe,,,,12.5,bonus",
        "credit,c2,adam,,,,3,bonus"
    ])?;

    let report = Replay::new(&engine).run(&path(&file)?).await?;
    let mut output = Vec::new();

    write_summaries(&engine, &report.accounts, &mut output).await?;

    let text = String::from_utf8(output)?;
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines, vec![
        "account,earned,pending,approved,withdrawn,available",
        "adam,3.00,0.00,0.00,0.00,3.00",
        "zoe,12.50,0.00,0.00,0.00,12.50"
    ]);

    Ok(())
}

#[tokio::test]
async fn test_summary_cache_expires_after_ttl() -> Result<()> {
    let engine = create_engine(&Config { summary_cache_ttl: Duration::from_millis(100), ..Config::default() });

    assert_eq!(engine.balances().summary("dora").await?.total_earned, Monetary::ZERO);

    let mut batch = WriteBatch::default();
    batch.insert_transaction(CashbackTransaction::credit(
        "dora".to_string(),
        "dora".to_string(),
        Monetary::from_str("4.00")?,
        "import".to_string(),
        Utc::now()
    ));
    engine.store().apply(batch)?;

    sleep(Duration::from_millis(200)).await;

    assert_eq!(engine.balances().summary("dora").await?.total_earned, Monetary::from_str("4.00")?);

    Ok(())
}
