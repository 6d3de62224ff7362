//! Forecast engine: per-instrument linear trend on ordinal day number.
//!
//! Ordinary least squares of close against days-since-epoch, fitted with the
//! regressor centred on its mean. Projections cover every calendar day after
//! the last observed date, weekends included.

use crate::domain::{day_ordinal, ForecastRecord, PriceBar, TrendDirection};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Longest projection accepted (100 years of calendar days).
pub const MAX_HORIZON_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ForecastError {
    #[error("{instrument}: need at least 2 distinct dates to fit a trend, got {dates}")]
    InsufficientHistory { instrument: String, dates: usize },

    #[error("forecast horizon must be at least one day")]
    ZeroHorizon,

    #[error("forecast horizon of {requested} days exceeds the maximum of {max}")]
    HorizonTooLong { requested: u32, max: u32 },

    #[error("{instrument}: trend fit produced non-finite coefficients")]
    Degenerate { instrument: String },
}

/// Fitted `close = intercept + slope * (ordinal - anchor)` line.
///
/// `anchor` is the mean ordinal of the fitted dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendModel {
    pub instrument: String,
    /// Price change per calendar day.
    pub slope: f64,
    /// Fitted close at the anchor.
    pub intercept: f64,
    pub anchor: f64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub observations: usize,
}

impl TrendModel {
    /// Fit on one instrument's bars. Order does not matter.
    pub fn fit(instrument: &str, series: &[PriceBar]) -> Result<Self, ForecastError> {
        let distinct: BTreeSet<NaiveDate> = series.iter().map(|b| b.date).collect();
        let (first_date, last_date) = match (distinct.first(), distinct.last()) {
            (Some(&first), Some(&last)) if distinct.len() >= 2 => (first, last),
            _ => {
                return Err(ForecastError::InsufficientHistory {
                    instrument: instrument.to_string(),
                    dates: distinct.len(),
                })
            }
        };

        let n = series.len() as f64;
        let anchor = series.iter().map(|b| day_ordinal(b.date) as f64).sum::<f64>() / n;
        let mean_y = series.iter().map(|b| b.close).sum::<f64>() / n;

        let (mut sxy, mut sxx) = (0.0, 0.0);
        for b in series {
            let dx = day_ordinal(b.date) as f64 - anchor;
            sxy += dx * (b.close - mean_y);
            sxx += dx * dx;
        }
        let slope = sxy / sxx;

        if !(slope.is_finite() && mean_y.is_finite()) {
            return Err(ForecastError::Degenerate {
                instrument: instrument.to_string(),
            });
        }

        Ok(Self {
            instrument: instrument.to_string(),
            slope,
            intercept: mean_y,
            anchor,
            first_date,
            last_date,
            observations: series.len(),
        })
    }

    pub fn predict(&self, date: NaiveDate) -> f64 {
        self.intercept + self.slope * (day_ordinal(date) as f64 - self.anchor)
    }

    pub fn direction(&self) -> TrendDirection {
        TrendDirection::from_slope(self.slope)
    }

    /// One record per calendar day for `horizon_days` days after `last_date`.
    ///
    /// Stops early at the last representable date.
    pub fn project(&self, horizon_days: u32) -> Vec<ForecastRecord> {
        (1..=i64::from(horizon_days))
            .map_while(|k| self.last_date.checked_add_signed(Duration::days(k)))
            .map(|date| ForecastRecord {
                instrument: self.instrument.clone(),
                date,
                predicted_close: self.predict(date),
            })
            .collect()
    }
}

/// Forecast output for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub model: TrendModel,
    pub records: Vec<ForecastRecord>,
}

/// Fit and project one instrument's series.
pub fn forecast(
    instrument: &str,
    series: &[PriceBar],
    horizon_days: u32,
) -> Result<Forecast, ForecastError> {
    if horizon_days == 0 {
        return Err(ForecastError::ZeroHorizon);
    }
    if horizon_days > MAX_HORIZON_DAYS {
        return Err(ForecastError::HorizonTooLong {
            requested: horizon_days,
            max: MAX_HORIZON_DAYS,
        });
    }
    let model = TrendModel::fit(instrument, series)?;
    let records = model.project(horizon_days);
    Ok(Forecast { model, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    #[test]
    fn rising_closes_project_upward() {
        let bars = make_bars(&[100.0, 102.0, 104.0, 106.0]);
        let fc = forecast("TEST", &bars, 1).unwrap();
        assert!(fc.model.slope > 0.0);
        assert!((fc.model.slope - 2.0).abs() < 1e-9);
        assert_eq!(fc.model.direction(), TrendDirection::Up);
        assert_eq!(fc.records.len(), 1);
        assert!((fc.records[0].predicted_close - 108.0).abs() < 1e-9);
        assert_eq!(fc.records[0].date, bars[3].date + Duration::days(1));
    }

    #[test]
    fn horizon_dates_are_consecutive_days() {
        let bars = make_bars(&[10.0, 9.0, 11.0, 10.5]);
        let fc = forecast("TEST", &bars, 30).unwrap();
        assert_eq!(fc.records.len(), 30);
        assert_eq!(fc.records[0].date, fc.model.last_date + Duration::days(1));
        for w in fc.records.windows(2) {
            assert_eq!(w[1].date - w[0].date, Duration::days(1));
        }
    }

    #[test]
    fn one_date_is_insufficient() {
        let bars = make_bars(&[100.0]);
        assert_eq!(
            forecast("TEST", &bars, 5).unwrap_err(),
            ForecastError::InsufficientHistory {
                instrument: "TEST".into(),
                dates: 1
            }
        );
        assert!(matches!(
            forecast("TEST", &[], 5),
            Err(ForecastError::InsufficientHistory { dates: 0, .. })
        ));
    }

    #[test]
    fn zero_horizon_is_rejected() {
        let bars = make_bars(&[1.0, 2.0]);
        assert_eq!(forecast("TEST", &bars, 0).unwrap_err(), ForecastError::ZeroHorizon);
    }

    #[test]
    fn oversized_horizon_is_rejected() {
        let bars = make_bars(&[1.0, 2.0]);
        assert_eq!(
            forecast("TEST", &bars, MAX_HORIZON_DAYS + 1).unwrap_err(),
            ForecastError::HorizonTooLong {
                requested: MAX_HORIZON_DAYS + 1,
                max: MAX_HORIZON_DAYS
            }
        );
        assert_eq!(
            forecast("TEST", &bars, MAX_HORIZON_DAYS).unwrap().records.len(),
            MAX_HORIZON_DAYS as usize
        );
    }

    #[test]
    fn projection_stops_at_last_representable_date() {
        let mut bars = make_bars(&[1.0, 2.0]);
        bars[0].date = NaiveDate::MAX - Duration::days(3);
        bars[1].date = NaiveDate::MAX - Duration::days(2);
        let model = TrendModel::fit("TEST", &bars).unwrap();
        let records = model.project(10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].date, NaiveDate::MAX);
    }

    #[test]
    fn gaps_use_calendar_distance() {
        // Two points three days apart: slope is per calendar day.
        let mut bars = make_bars(&[100.0, 106.0]);
        bars[1].date = bars[0].date + Duration::days(3);
        let model = TrendModel::fit("TEST", &bars).unwrap();
        assert!((model.slope - 2.0).abs() < 1e-9);
        assert!((model.predict(bars[1].date + Duration::days(1)) - 108.0).abs() < 1e-9);
    }

    #[test]
    fn flat_series_has_flat_trend() {
        let bars = make_bars(&[50.0; 10]);
        let model = TrendModel::fit("TEST", &bars).unwrap();
        assert_eq!(model.direction(), TrendDirection::Flat);
        assert!((model.predict(model.last_date + Duration::days(100)) - 50.0).abs() < 1e-9);
    }
}
