//! Simple moving average of close.
//!
//! Each value is the mean of the trailing `period` closes, summed afresh per
//! window so a single extreme close cannot leave drift in later values.

use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }

    fn window_mean(&self, window: &[PriceBar]) -> f64 {
        if window.iter().all(|b| b.close.is_finite()) {
            window.iter().map(|b| b.close).sum::<f64>() / self.period as f64
        } else {
            f64::NAN
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let mut out = vec![f64::NAN; self.lookback().min(bars.len())];
        out.extend(bars.windows(self.period).map(|w| self.window_mean(w)));
        out
    }
}
