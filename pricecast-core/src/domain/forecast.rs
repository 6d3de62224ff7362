//! Forecast output types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One projected close for one future calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub instrument: String,
    pub date: NaiveDate,
    pub predicted_close: f64,
}

/// Sign of a fitted slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

impl TrendDirection {
    pub fn from_slope(slope: f64) -> Self {
        if slope > 0.0 {
            TrendDirection::Up
        } else if slope < 0.0 {
            TrendDirection::Down
        } else {
            TrendDirection::Flat
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrendDirection::Up => "uptrend",
            TrendDirection::Down => "downtrend",
            TrendDirection::Flat => "flat",
        };
        f.write_str(s)
    }
}
