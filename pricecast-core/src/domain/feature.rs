//! FeatureRecord: a price bar with its rolling indicators.

use super::bar::PriceBar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A bar augmented with indicators.
///
/// Only constructed for dates where every contributing window is full, so no
/// field is ever NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub date: NaiveDate,
    pub instrument: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub sma_short: f64,
    pub sma_long: f64,
    pub volatility: f64,
    pub daily_return_pct: f64,
}

/// Indicator values for one row, all defined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Indicators {
    pub sma_short: f64,
    pub sma_long: f64,
    pub volatility: f64,
    pub daily_return_pct: f64,
}

impl Indicators {
    pub fn all_finite(&self) -> bool {
        self.sma_short.is_finite()
            && self.sma_long.is_finite()
            && self.volatility.is_finite()
            && self.daily_return_pct.is_finite()
    }
}

impl FeatureRecord {
    pub fn new(bar: &PriceBar, ind: Indicators) -> Self {
        Self {
            date: bar.date,
            instrument: bar.instrument.clone(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            sma_short: ind.sma_short,
            sma_long: ind.sma_long,
            volatility: ind.volatility,
            daily_return_pct: ind.daily_return_pct,
        }
    }
}
