//! Daily return in percent.
//!
//! ret[t] = (close[t] / close[t-1] - 1) * 100
//! Lookback: 1.

use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone, Default)]
pub struct DailyReturn;

impl DailyReturn {
    pub fn new() -> Self {
        Self
    }
}

impl Indicator for DailyReturn {
    fn name(&self) -> &str {
        "daily_return_pct"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];
        for (i, pair) in bars.windows(2).enumerate() {
            let (prev, curr) = (pair[0].close, pair[1].close);
            if prev.is_finite() && curr.is_finite() && prev != 0.0 {
                result[i + 1] = (curr / prev - 1.0) * 100.0;
            }
        }
        result
    }
}
