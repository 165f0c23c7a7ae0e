use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::{BufReader, Write};

use anyhow::{anyhow, Context};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{spawn_blocking, JoinHandle};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::attribution::ClickRequest;
use crate::engine::CashbackEngine;
use crate::models::{CaptureMetadata, PayoutMethod};
use crate::storage::Store;
use crate::types::{AccountId, ClickToken, Monetary, TransactionId, WithdrawalId};
use crate::withdrawal::NewWithdrawal;

const DEFAULT_PAYOUT_METHOD: &str = "bank_transfer";
const SUMMARY_HEADER: [&str; 6] = ["account", "earned", "pending", "approved", "withdrawn", "available"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOp {
    Click,
    Conversion,
    Approve,
    Reject,
    Credit,
    Withdraw,
    Process,
    Complete,
    RejectWithdrawal
}

impl Display for FeedOp {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{self:?}")
    }
}

/// One row of an operation feed.
///
/// `reference` is an alias chosen by the feed: a click alias for `click` and
/// `conversion`, the order reference for `approve` and `reject`, and a
/// withdrawal alias for the withdrawal operations. `detail` carries the order
/// reference, reason, description, payout method or external reference,
/// depending on the operation.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedRecord {
    pub op: FeedOp,
    #[serde(rename = "ref")]
    pub reference: String,
    pub user: Option<String>,
    pub product: Option<String>,
    pub store: Option<String>,
    pub affiliate: Option<String>,
    pub amount: Option<Monetary>,
    pub detail: Option<String>
}

/// What a replay did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: usize,
    /// Unreadable rows plus rows the engine refused.
    pub skipped: usize,
    /// Accounts touched by at least one applied row, in order.
    pub accounts: BTreeSet<AccountId>
}

/// A feed row with its line number, or the reason it could not be read.
type FeedLine = (u64, Result<FeedRecord, csv::Error>);

#[derive(Default)]
struct Aliases {
    clicks: HashMap<String, ClickToken>,
    orders: HashMap<String, TransactionId>,
    withdrawals: HashMap<String, WithdrawalId>
}

impl Aliases {
    fn click(&self, reference: &str) -> ClickToken {
        self.clicks.get(reference).cloned().unwrap_or_else(|| ClickToken::from(reference))
    }

    fn order(&self, reference: &str) -> anyhow::Result<TransactionId> {
        lookup(&self.orders, reference, "order")
    }

    fn withdrawal(&self, reference: &str) -> anyhow::Result<WithdrawalId> {
        lookup(&self.withdrawals, reference, "withdrawal")
    }
}

fn lookup(aliases: &HashMap<String, Uuid>, reference: &str, kind: &str) -> anyhow::Result<Uuid> {
    if let Some(id) = aliases.get(reference) {
        return Ok(*id);
    }

    Uuid::parse_str(reference).map_err(|_| anyhow!("Unknown {kind} reference [{reference}]"))
}

fn required<T>(value: Option<T>, field: &str) -> anyhow::Result<T> {
    value.ok_or_else(|| anyhow!("Column [{field}] is required"))
}

/// Replays a CSV operation feed against a [`CashbackEngine`].
pub struct Replay<'a, S: Store> {
    engine: &'a CashbackEngine<S>,
    backpressure: usize
}

impl<'a, S: Store> Replay<'a, S> {
    pub fn new(engine: &'a CashbackEngine<S>) -> Self {
        Self {
            engine,
            backpressure: 256
        }
    }

    /// Streams the feed from disk and applies each row in order.
    ///
    /// Unreadable rows and rows the engine refuses are logged and skipped.
    pub async fn run(&self, path: &str) -> anyhow::Result<ReplayReport> {
        let (sender, receiver) = mpsc::channel::<FeedLine>(self.backpressure);
        let csv_handle = spawn_csv_reader(path.to_string(), sender);
        let report = self.apply_feed(receiver).await;

        if let Err(error) = csv_handle.await {
            error!("CSV ingestion failed: {error}");
        }

        Ok(report)
    }

    async fn apply_feed(&self, mut receiver: mpsc::Receiver<FeedLine>) -> ReplayReport {
        let mut aliases = Aliases::default();
        let mut report = ReplayReport::default();

        //NOTE: Rows are applied strictly in feed order, later rows refer to aliases created by earlier ones
        while let Some((line, parsed)) = receiver.recv().await {
            let record = match parsed {
                Ok(record) => record,
                Err(error) => {
                    report.skipped += 1;
                    warn!("Feed line [{line}] skipped, unreadable row: {error}");
                    continue;
                }
            };

            let op = record.op;

            match self.apply(record, &mut aliases).await {
                Ok(account) => {
                    report.applied += 1;
                    report.accounts.extend(account);
                },
                Err(error) => {
                    report.skipped += 1;
                    warn!("Feed line [{line}] [{op}] skipped: {error:#}");
                }
            }
        }

        debug!("Feed replayed: [{}] applied, [{}] skipped", report.applied, report.skipped);

        report
    }

    async fn apply(&self, record: FeedRecord, aliases: &mut Aliases) -> anyhow::Result<Option<AccountId>> {
        let reference = record.reference;

        match record.op {
            FeedOp::Click => {
                let request = ClickRequest {
                    product_id: required(record.product, "product")?,
                    store_id: required(record.store, "store")?,
                    affiliate_id: required(record.affiliate, "affiliate")?,
                    user_id: record.user.clone(),
                    metadata: CaptureMetadata::default()
                };

                let token = self.engine.tracker().track_click(request)?;
                aliases.clicks.insert(reference, token);

                Ok(record.user)
            },
            FeedOp::Conversion => {
                let order_ref = required(record.detail, "detail")?;
                let amount = required(record.amount, "amount")?;
                let token = aliases.click(&reference);

                let outcome = self.engine.tracker().track_conversion(&token, &order_ref, amount).await?;

                Ok(outcome.transaction.map(|transaction| {
                    aliases.orders.insert(order_ref, transaction.id);
                    transaction.account_id
                }))
            },
            FeedOp::Approve => {
                let transaction = self.engine.ledger().approve(aliases.order(&reference)?).await?;
                Ok(Some(transaction.account_id))
            },
            FeedOp::Reject => {
                let reason = required(record.detail, "detail")?;
                let transaction = self.engine.ledger().reject(aliases.order(&reference)?, &reason).await?;
                Ok(Some(transaction.account_id))
            },
            FeedOp::Credit => {
                let user = required(record.user, "user")?;
                let amount = required(record.amount, "amount")?;
                let description = required(record.detail, "detail")?;

                let transaction = self.engine.ledger().credit(user.clone(), user, amount, &description).await?;
                Ok(Some(transaction.account_id))
            },
            FeedOp::Withdraw => {
                let user = required(record.user, "user")?;
                let method = record.detail.unwrap_or_else(|| DEFAULT_PAYOUT_METHOD.to_string());

                let withdrawal = self.engine.withdrawals().create(NewWithdrawal {
                    user_id: user.clone(),
                    account_id: user,
                    amount: required(record.amount, "amount")?,
                    payout: PayoutMethod::new(&method)
                }).await?;

                aliases.withdrawals.insert(reference, withdrawal.id);
                Ok(Some(withdrawal.account_id))
            },
            FeedOp::Process => {
                let withdrawal = self.engine.withdrawals().process(aliases.withdrawal(&reference)?).await?;
                Ok(Some(withdrawal.account_id))
            },
            FeedOp::Complete => {
                let external_ref = required(record.detail, "detail")?;
                let completed = self.engine.withdrawals().complete(aliases.withdrawal(&reference)?, &external_ref).await?;
                Ok(Some(completed.withdrawal.account_id))
            },
            FeedOp::RejectWithdrawal => {
                let reason = required(record.detail, "detail")?;
                let withdrawal = self.engine.withdrawals().reject(aliases.withdrawal(&reference)?, &reason).await?;
                Ok(Some(withdrawal.account_id))
            }
        }
    }
}

fn spawn_csv_reader(path: String, sender: mpsc::Sender<FeedLine>) -> JoinHandle<()> {
    spawn_blocking(move || {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(error) => {
                error!("Error opening CSV at path: {path} | {error}");
                return;
            }
        };

        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(BufReader::new(file));

        //NOTE: Line numbers assume single-line records, the header is line 1
        for (index, result) in reader.deserialize::<FeedRecord>().enumerate() {
            let line = index as u64 + 2;

            if sender.blocking_send((line, result)).is_err() {
                break;
            }
        }
    })
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    account: &'a str,
    earned: Monetary,
    pending: Monetary,
    approved: Monetary,
    withdrawn: Monetary,
    available: Monetary
}

/// Writes one CSV row of balance totals per account.
pub async fn write_summaries<'a, S, W, I>(engine: &CashbackEngine<S>, accounts: I, writer: W) -> anyhow::Result<()>
where
    S: Store,
    W: Write,
    I: IntoIterator<Item = &'a AccountId>
{
    //NOTE: The header is written up front so an empty feed still yields a well-formed file
    let mut output = WriterBuilder::new().has_headers(false).from_writer(writer);
    output.write_record(SUMMARY_HEADER)?;

    for account in accounts {
        let summary = engine.balances().summary(account).await
            .with_context(|| format!("Summary for account [{account}] unavailable"))?;

        output.serialize(SummaryRow {
            account,
            earned: summary.total_earned,
            pending: summary.total_pending,
            approved: summary.total_approved,
            withdrawn: summary.total_withdrawn,
            available: summary.available_balance
        })?;
    }

    output.flush()?;

    Ok(())
}
