//! Feature deriver: rolling indicators per instrument.
//!
//! Each instrument's bars are windowed separately (partition first, then
//! window). A row is emitted only when every indicator is defined, so a series
//! of N bars yields `N - (window_long - 1)` records, or none when
//! `N < window_long`.

use crate::domain::{FeatureRecord, Indicators, PriceBar, SeriesDataset};
use crate::indicators::{DailyReturn, Indicator, Sma, Volatility};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureError {
    #[error("window_short must be at least 2, got {0}")]
    ShortWindowTooSmall(usize),

    #[error("window_long ({long}) must exceed window_short ({short})")]
    WindowOrder { short: usize, long: usize },
}

/// Window lengths, in bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub window_short: usize,
    pub window_long: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window_short: 20,
            window_long: 50,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.window_short < 2 {
            return Err(FeatureError::ShortWindowTooSmall(self.window_short));
        }
        if self.window_long <= self.window_short {
            return Err(FeatureError::WindowOrder {
                short: self.window_short,
                long: self.window_long,
            });
        }
        Ok(())
    }
}

/// Computes `FeatureRecord`s from price series.
#[derive(Debug, Clone)]
pub struct FeatureDeriver {
    config: FeatureConfig,
    sma_short: Sma,
    sma_long: Sma,
    volatility: Volatility,
    daily_return: DailyReturn,
}

impl FeatureDeriver {
    pub fn new(config: FeatureConfig) -> Result<Self, FeatureError> {
        config.validate()?;
        Ok(Self {
            config,
            sma_short: Sma::new(config.window_short),
            sma_long: Sma::new(config.window_long),
            volatility: Volatility::new(config.window_short),
            daily_return: DailyReturn::new(),
        })
    }

    pub fn config(&self) -> FeatureConfig {
        self.config
    }

    /// First index with every indicator defined.
    pub fn warmup(&self) -> usize {
        self.indicators()
            .iter()
            .map(|ind| ind.lookback())
            .max()
            .unwrap_or(0)
    }

    fn indicators(&self) -> [&dyn Indicator; 4] {
        [
            &self.sma_short,
            &self.sma_long,
            &self.volatility,
            &self.daily_return,
        ]
    }

    /// Derive features for one instrument's date-sorted bars.
    pub fn derive(&self, series: &[PriceBar]) -> Vec<FeatureRecord> {
        debug_assert!(
            series
                .windows(2)
                .all(|w| w[0].date < w[1].date && w[0].instrument == w[1].instrument),
            "derive expects one instrument, strictly ascending dates"
        );

        let warmup = self.warmup();
        if series.len() <= warmup {
            return Vec::new();
        }

        let sma_short = self.sma_short.compute(series);
        let sma_long = self.sma_long.compute(series);
        let volatility = self.volatility.compute(series);
        let daily_return = self.daily_return.compute(series);

        (warmup..series.len())
            .filter_map(|i| {
                let ind = Indicators {
                    sma_short: sma_short[i],
                    sma_long: sma_long[i],
                    volatility: volatility[i],
                    daily_return_pct: daily_return[i],
                };
                ind.all_finite().then(|| FeatureRecord::new(&series[i], ind))
            })
            .collect()
    }

    /// Derive features for every instrument in the dataset.
    pub fn derive_all(&self, dataset: &SeriesDataset) -> BTreeMap<String, Vec<FeatureRecord>> {
        dataset
            .partition()
            .into_iter()
            .map(|(instrument, series)| {
                let records = self.derive(&series);
                (instrument, records)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars};

    fn deriver(short: usize, long: usize) -> FeatureDeriver {
        FeatureDeriver::new(FeatureConfig {
            window_short: short,
            window_long: long,
        })
        .unwrap()
    }

    fn closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn limiting_window_of_twenty() {
        let d = deriver(5, 20);
        let out = d.derive(&make_bars(&closes(20)));
        assert_eq!(out.len(), 1);
        let bars = make_bars(&closes(20));
        assert_eq!(out[0].date, bars[19].date);
        assert!(d.derive(&make_bars(&closes(19))).is_empty());
    }

    #[test]
    fn emits_n_minus_long_window_plus_one() {
        let d = deriver(20, 50);
        assert_eq!(d.derive(&make_bars(&closes(120))).len(), 71);
        assert_eq!(d.derive(&make_bars(&closes(50))).len(), 1);
        assert!(d.derive(&make_bars(&closes(49))).is_empty());
        assert!(d.derive(&[]).is_empty());
    }

    #[test]
    fn values_match_hand_computation() {
        let d = deriver(2, 3);
        let out = d.derive(&make_bars(&[10.0, 12.0, 15.0]));
        assert_eq!(out.len(), 1);
        let r = &out[0];
        assert_approx(r.sma_short, 13.5, 1e-12);
        assert_approx(r.sma_long, 37.0 / 3.0, 1e-12);
        // sample std of [12, 15]
        assert_approx(r.volatility, (4.5_f64).sqrt(), 1e-12);
        assert_approx(r.daily_return_pct, 25.0, 1e-9);
        assert_eq!(r.close, 15.0);
    }

    #[test]
    fn instruments_are_windowed_separately() {
        let mut a = make_bars(&closes(4));
        let mut b = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        for bar in &mut a {
            bar.instrument = "AAA".into();
        }
        for bar in &mut b {
            bar.instrument = "BBB".into();
        }
        let ds = SeriesDataset::from_unsorted(a.into_iter().chain(b));
        let out = deriver(2, 3).derive_all(&ds);
        assert_eq!(out["AAA"].len(), 2);
        assert_eq!(out["BBB"].len(), 2);
        // BBB's first row only sees BBB closes.
        assert_approx(out["BBB"][0].sma_long, 2.0, 1e-12);
        assert!(out["BBB"].iter().all(|r| r.instrument == "BBB"));
    }

    #[test]
    fn config_validation() {
        assert!(FeatureConfig::default().validate().is_ok());
        assert_eq!(
            FeatureConfig {
                window_short: 1,
                window_long: 5
            }
            .validate(),
            Err(FeatureError::ShortWindowTooSmall(1))
        );
        assert!(matches!(
            FeatureDeriver::new(FeatureConfig {
                window_short: 20,
                window_long: 20
            }),
            Err(FeatureError::WindowOrder { .. })
        ));
    }

    #[test]
    fn warmup_is_long_window_lookback() {
        assert_eq!(deriver(20, 50).warmup(), 49);
    }
}
