//! Property tests for dataset invariants.
//!
//! Uses proptest to verify:
//! 1. Merge idempotence: merging the same batch twice changes nothing
//! 2. Dedup: one row per (date, instrument), carrying the incoming value
//! 3. Ordering: merged rows are strictly ascending for any input order
//! 4. Window completeness: N bars yield N - (W2 - 1) feature rows, all finite
//! 5. Forecast horizon: exactly `horizon` consecutive days after the last bar

use chrono::{Duration, NaiveDate};
use pricecast_core::data::merge::{merge, merge_with_report};
use pricecast_core::domain::{PriceBar, SeriesDataset};
use pricecast_core::features::{FeatureConfig, FeatureDeriver};
use pricecast_core::forecast::forecast;
use proptest::prelude::*;
use std::collections::BTreeMap;

// ── Strategies (proptest) ────────────────────────────────────────────

const INSTRUMENTS: [&str; 3] = ["AAPL", "MSFT", "TSLA"];

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn make_bar(day: u16, inst: usize, close: f64) -> PriceBar {
    PriceBar {
        date: base_date() + Duration::days(i64::from(day)),
        instrument: INSTRUMENTS[inst].to_string(),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000,
    }
}

fn arb_bar() -> impl Strategy<Value = PriceBar> {
    (0u16..40, 0usize..INSTRUMENTS.len(), 10.0..500.0_f64)
        .prop_map(|(day, inst, close)| make_bar(day, inst, (close * 100.0).round() / 100.0))
}

fn arb_bars() -> impl Strategy<Value = Vec<PriceBar>> {
    prop::collection::vec(arb_bar(), 0..60)
}

fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..1000.0_f64, 0..120)
}

fn series(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(i as u16, 0, c))
        .collect()
}

// ── 1-3. Merge ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn merge_is_idempotent(existing in arb_bars(), incoming in arb_bars()) {
        let s = SeriesDataset::from_unsorted(existing);
        let i = SeriesDataset::from_unsorted(incoming);
        let once = merge(&s, &i);
        let twice = merge(&once, &i);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merge_keeps_one_row_per_key_with_incoming_value(
        existing in arb_bars(),
        incoming in arb_bars(),
    ) {
        let s = SeriesDataset::from_unsorted(existing);
        let i = SeriesDataset::from_unsorted(incoming);
        let (merged, report) = merge_with_report(&s, &i);

        let mut expected: BTreeMap<(NaiveDate, String), f64> = BTreeMap::new();
        for b in s.bars().iter().chain(i.bars()) {
            expected.insert((b.date, b.instrument.clone()), b.close);
        }

        prop_assert_eq!(merged.len(), expected.len());
        prop_assert_eq!(report.after, expected.len());
        prop_assert_eq!(report.before + report.added(), report.after);
        for b in merged.bars() {
            prop_assert_eq!(expected[&(b.date, b.instrument.clone())], b.close);
        }
    }

    #[test]
    fn merged_rows_are_strictly_ascending(existing in arb_bars(), incoming in arb_bars()) {
        let mut shuffled = incoming.clone();
        shuffled.reverse();
        let merged = merge(
            &SeriesDataset::from_unsorted(existing),
            &SeriesDataset::from_unsorted(shuffled),
        );
        for w in merged.bars().windows(2) {
            prop_assert!(w[0].key() < w[1].key());
        }
    }
}

// ── 4. Window completeness ───────────────────────────────────────────

proptest! {
    #[test]
    fn feature_count_matches_window(
        closes in arb_closes(),
        short in 2usize..10,
        extra in 1usize..30,
    ) {
        let long = short + extra;
        let deriver = FeatureDeriver::new(FeatureConfig {
            window_short: short,
            window_long: long,
        })
        .unwrap();
        let out = deriver.derive(&series(&closes));

        let expected = closes.len().saturating_sub(long - 1);
        prop_assert_eq!(out.len(), expected);
        for r in &out {
            prop_assert!(r.sma_short.is_finite());
            prop_assert!(r.sma_long.is_finite());
            prop_assert!(r.volatility.is_finite() && r.volatility >= 0.0);
            prop_assert!(r.daily_return_pct.is_finite());
        }
    }
}

// ── 5. Forecast horizon ──────────────────────────────────────────────

proptest! {
    #[test]
    fn forecast_covers_horizon_day_by_day(
        closes in prop::collection::vec(1.0..1000.0_f64, 2..60),
        horizon in 1u32..400,
    ) {
        let bars = series(&closes);
        let last = bars[bars.len() - 1].date;
        let fc = forecast("AAPL", &bars, horizon).unwrap();

        prop_assert_eq!(fc.records.len(), horizon as usize);
        prop_assert_eq!(fc.records[0].date, last + Duration::days(1));
        for w in fc.records.windows(2) {
            prop_assert_eq!(w[1].date, w[0].date + Duration::days(1));
        }
        prop_assert!(fc.records.iter().all(|r| r.predicted_close.is_finite()));
    }
}
