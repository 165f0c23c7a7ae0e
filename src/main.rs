use std::io::{stderr, stdout};
use std::process::exit;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

use cashback_ledger::actors::LogNotifier;
use cashback_ledger::config::Config;
use cashback_ledger::engine::{write_summaries, CashbackEngine, Replay};
use cashback_ledger::storage::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: cashback-ledger [feed].csv [log_level:optional] > [summary].csv");
        eprintln!("Available log levels: error, warn, info, debug, trace (default: error)");
        exit(1);
    }

    let path = &args[1];
    let log_level = args.get(2)
        .map(|s| parse_log_level(s)).unwrap_or(LevelFilter::ERROR);

    setup_logging(log_level);
    dotenv::dotenv().ok();

    let config = Config::from_env();
    let engine = CashbackEngine::new(Arc::new(MemoryStore::new()), &config, Arc::new(LogNotifier));

    let timer = Instant::now();
    let report = Replay::new(&engine).run(path).await?;
    let duration = timer.elapsed();

    info!("Replayed [{}] operations ([{}] skipped) in: {duration:?}", report.applied, report.skipped);

    write_summaries(&engine, &report.accounts, stdout().lock()).await?;

    engine.shutdown().await?;

    Ok(())
}

fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to 'error'", level);
            LevelFilter::ERROR
        }
    }
}

fn setup_logging(level: LevelFilter) {
    //NOTE: stdout carries the summary CSV, so logging goes to stderr
    let terminal_log = fmt::layer()
        .with_target(false)
        .with_writer(stderr)
        .with_filter(level);

    tracing_subscriber::registry()
        .with(terminal_log)
        .init();
}
