use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::warn;

use crate::types::{Monetary, Rate};

pub const DEFAULT_CASHBACK_RATE: Decimal = Decimal::from_parts(25, 0, 0, false, 1);
pub const MIN_WITHDRAWAL_AMOUNT: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
pub const STATS_WINDOW_DAYS: u32 = 30;
pub const SUMMARY_CACHE_CAPACITY: u64 = 10_000;
pub const SUMMARY_CACHE_TTL_SECS: u64 = 60;
pub const MAX_STATS_WINDOW_DAYS: u32 = 36_500;
pub const MAX_SUMMARY_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Runtime settings for the cashback engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Percentage of order value paid back on conversion.
    pub commission_rate: Rate,
    pub min_withdrawal: Monetary,
    /// Percentage withheld from each withdrawal, fixed per request at creation.
    pub withdrawal_fee_rate: Rate,
    /// Window used for attribution stats when the caller gives none.
    pub stats_window_days: u32,
    pub summary_cache_capacity: u64,
    pub summary_cache_ttl: Duration
}

impl Default for Config {
    fn default() -> Self {
        Self {
            commission_rate: Rate::new(DEFAULT_CASHBACK_RATE).unwrap_or_else(|_| Rate::zero()),
            min_withdrawal: Monetary::new(MIN_WITHDRAWAL_AMOUNT).unwrap_or(Monetary::ZERO),
            withdrawal_fee_rate: Rate::zero(),
            stats_window_days: STATS_WINDOW_DAYS,
            summary_cache_capacity: SUMMARY_CACHE_CAPACITY,
            summary_cache_ttl: Duration::from_secs(SUMMARY_CACHE_TTL_SECS)
        }
    }
}

impl Config {
    /// Reads settings from the process environment.
    ///
    /// Call `dotenv::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`. Unset keys keep their defaults,
    /// unparseable ones are logged and keep their defaults too.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>
    {
        let defaults = Self::default();

        Self {
            commission_rate: setting(&lookup, "DEFAULT_CASHBACK_RATE", defaults.commission_rate),
            min_withdrawal: setting(&lookup, "MIN_WITHDRAWAL_AMOUNT", defaults.min_withdrawal),
            withdrawal_fee_rate: setting(&lookup, "WITHDRAWAL_FEE_RATE", defaults.withdrawal_fee_rate),
            stats_window_days: bounded_setting(&lookup, "STATS_WINDOW_DAYS", defaults.stats_window_days, MAX_STATS_WINDOW_DAYS),
            summary_cache_capacity: setting(&lookup, "SUMMARY_CACHE_CAPACITY", defaults.summary_cache_capacity),
            summary_cache_ttl: Duration::from_secs(bounded_setting(
                &lookup,
                "SUMMARY_CACHE_TTL_SECS",
                defaults.summary_cache_ttl.as_secs(),
                MAX_SUMMARY_CACHE_TTL_SECS
            ))
        }
    }
}

fn setting<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display
{
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(error) => {
            warn!("Ignoring [{key}={raw}] ({error}), using [{default}]");
            default
        }
    }
}

/// Like [`setting`], but values above `max` are logged and replaced by the default.
fn bounded_setting<F, T>(lookup: &F, key: &str, default: T, max: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display + PartialOrd + Copy,
    T::Err: Display
{
    let value = setting(lookup, key, default);

    if value > max {
        warn!("Ignoring [{key}={value}], the maximum is [{max}], using [{default}]");
        return default;
    }

    value
}
