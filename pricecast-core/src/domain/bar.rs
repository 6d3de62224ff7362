//! PriceBar: one instrument's price observation for one calendar day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar for a single instrument.
///
/// `date` carries no time-of-day. `close` is the canonical price used by the
/// feature deriver and the forecast engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub instrument: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceBar {
    /// The dedup and ordering key: `(date, instrument)`.
    pub fn key(&self) -> (NaiveDate, &str) {
        (self.date, self.instrument.as_str())
    }

    /// Returns true if any price field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity: positive close, high >= low, open and close within the range.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.close > 0.0
            && self.open > 0.0
            && self.high >= self.low
            && self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
    }

    /// Days since 1970-01-01. Used as the regressor of the trend model.
    pub fn ordinal(&self) -> i64 {
        day_ordinal(self.date)
    }
}

/// Days since 1970-01-01 for a calendar date.
pub fn day_ordinal(date: NaiveDate) -> i64 {
    date.signed_duration_since(NaiveDate::default()).num_days()
}
