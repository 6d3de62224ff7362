//! Rolling volatility: sample standard deviation of close.
//!
//! std[t] = sqrt( sum((close[i] - mean)^2) / (period - 1) ) over the trailing
//! `period` closes. Lookback: period - 1.

use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Volatility {
    period: usize,
    name: String,
}

impl Volatility {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "volatility period must be >= 2");
        Self {
            period,
            name: format!("volatility_{period}"),
        }
    }
}

impl Indicator for Volatility {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];
        if n < self.period {
            return result;
        }

        let denom = (self.period - 1) as f64;
        for i in (self.period - 1)..n {
            let window = &bars[(i + 1 - self.period)..=i];
            if window.iter().any(|b| b.close.is_nan()) {
                continue;
            }
            // Two-pass: mean first, then squared deviations.
            let mean = window.iter().map(|b| b.close).sum::<f64>() / self.period as f64;
            let ss: f64 = window.iter().map(|b| (b.close - mean).powi(2)).sum();
            result[i] = (ss / denom).sqrt();
        }

        result
    }
}
