//! Market data provider trait and structured fetch errors.
//!
//! The `MarketDataProvider` trait abstracts over data sources (Yahoo Finance,
//! synthetic random walks, fixed test batches) so the pipeline can swap
//! implementations and mock for tests.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raw daily OHLCV bar from a provider (before normalization).
///
/// Missing fields are NaN; the normalizer decides what survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl RawBar {
    /// A holiday/placeholder row with no prices at all.
    pub fn is_blank(&self) -> bool {
        self.open.is_nan() && self.high.is_nan() && self.low.is_nan() && self.close.is_nan()
    }
}

/// Per-instrument fetch failures.
///
/// Designed to be displayable in log lines and in the run summary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("fetch error: {0}")]
    Other(String),
}

/// Longest period a string may request (100 years).
pub const MAX_PERIOD_DAYS: u32 = 100 * 365;

/// Lookback window for a fetch, expressed the way providers do: `5d`, `1mo`, `1y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FetchPeriod {
    days: u32,
}

impl FetchPeriod {
    pub fn days(days: u32) -> Self {
        Self { days }
    }

    pub fn num_days(&self) -> u32 {
        self.days
    }

    /// Exclusive lower bound of the window ending on `end`, clamped to the
    /// earliest representable date.
    pub fn start_for(&self, end: NaiveDate) -> NaiveDate {
        end.checked_sub_signed(Duration::days(i64::from(self.days)))
            .unwrap_or(NaiveDate::MIN)
    }
}

impl FromStr for FetchPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("period '{s}' has no unit (expected d, wk, mo or y)"))?;
        let (num, unit) = s.split_at(split);
        let n: u32 = num
            .parse()
            .map_err(|_| format!("period '{s}' has no leading count"))?;
        let per_unit = match unit {
            "d" => 1,
            "wk" | "w" => 7,
            "mo" => 30,
            "y" => 365,
            other => return Err(format!("unknown period unit '{other}'")),
        };
        if n == 0 {
            return Err("period must be positive".into());
        }
        match n.checked_mul(per_unit) {
            Some(days) if days <= MAX_PERIOD_DAYS => Ok(Self { days }),
            _ => Err(format!("period '{s}' exceeds {MAX_PERIOD_DAYS} days")),
        }
    }
}

impl TryFrom<String> for FetchPeriod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FetchPeriod> for String {
    fn from(p: FetchPeriod) -> Self {
        p.to_string()
    }
}

impl fmt::Display for FetchPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days % 365 == 0 {
            write!(f, "{}y", self.days / 365)
        } else if self.days % 30 == 0 {
            write!(f, "{}mo", self.days / 30)
        } else {
            write!(f, "{}d", self.days)
        }
    }
}

/// Batches returned by a multi-instrument fetch, keyed by instrument.
pub type FetchBatches = BTreeMap<String, Result<Vec<RawBar>, FetchError>>;

/// Trait for market data providers.
///
/// Implementations handle the specifics of one source. A failure for one
/// instrument is a value in the returned map, never an error for the call.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily bars for one instrument over `period`, ending on `end`.
    fn fetch(
        &self,
        instrument: &str,
        period: FetchPeriod,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>, FetchError>;

    /// Fetch every instrument. An empty batch is a valid result.
    fn fetch_bars(
        &self,
        instruments: &[String],
        period: FetchPeriod,
        end: NaiveDate,
    ) -> FetchBatches {
        instruments
            .iter()
            .map(|inst| (inst.clone(), self.fetch(inst, period, end)))
            .collect()
    }
}

/// Provider that serves fixed batches. Unknown instruments get an empty batch.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    batches: BTreeMap<String, Result<Vec<RawBar>, FetchError>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, instrument: &str, bars: Vec<RawBar>) -> Self {
        self.batches.insert(instrument.to_string(), Ok(bars));
        self
    }

    pub fn with_error(mut self, instrument: &str, err: FetchError) -> Self {
        self.batches.insert(instrument.to_string(), Err(err));
        self
    }
}

impl MarketDataProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(
        &self,
        instrument: &str,
        period: FetchPeriod,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>, FetchError> {
        let start = period.start_for(end);
        match self.batches.get(instrument) {
            Some(Ok(bars)) => Ok(bars
                .iter()
                .filter(|b| b.date > start && b.date <= end)
                .cloned()
                .collect()),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(Vec::new()),
        }
    }
}
