//! Synthetic random-walk provider for demos and offline runs.
//!
//! Each instrument gets its own deterministic walk seeded from the base seed
//! and the instrument id, so the same `(seed, instrument, date)` always yields
//! the same bar. Weekends are skipped.

use super::provider::{FetchError, FetchPeriod, MarketDataProvider, RawBar};
use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random-walk bar generator.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    seed: u64,
    /// First date of every walk; fetch windows slice into it.
    origin: NaiveDate,
    start_price: f64,
    step: f64,
}

impl SyntheticProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            origin: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default(),
            start_price: 100.0,
            step: 2.0,
        }
    }

    fn instrument_seed(&self, instrument: &str) -> u64 {
        let hash = blake3::hash(instrument.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        self.seed ^ u64::from_le_bytes(bytes)
    }

    /// Generate the walk from `origin` through `end`, trading days only.
    fn walk(&self, instrument: &str, end: NaiveDate) -> Vec<RawBar> {
        let mut rng = StdRng::seed_from_u64(self.instrument_seed(instrument));
        let mut close = self.start_price;
        let mut bars = Vec::new();

        for date in self.origin.iter_days().take_while(|d| *d <= end) {
            if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }
            let open = close;
            let change: f64 = rng.gen_range(-1.0_f64..1.0) * self.step;
            // Keep prices strictly positive.
            close = (close + change).max(1.0);
            let wick: f64 = rng.gen_range(0.0..0.5);
            bars.push(RawBar {
                date,
                open,
                high: open.max(close) + wick,
                low: (open.min(close) - wick).max(0.5),
                close,
                volume: rng.gen_range(1_000_000..5_000_000),
            });
        }
        bars
    }
}

impl MarketDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        instrument: &str,
        period: FetchPeriod,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>, FetchError> {
        let start = period.start_for(end);
        Ok(self
            .walk(instrument, end)
            .into_iter()
            .filter(|b| b.date > start)
            .collect())
    }
}
