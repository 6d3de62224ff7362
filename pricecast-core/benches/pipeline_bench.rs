//! Criterion benchmarks for PriceCast hot paths.
//!
//! Benchmarks:
//! 1. Merge-dedup of a daily increment into multi-year history
//! 2. Feature derivation over a full history
//! 3. Trend fit and five-year projection

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pricecast_core::data::merge::merge_with_report;
use pricecast_core::domain::{PriceBar, SeriesDataset};
use pricecast_core::features::{FeatureConfig, FeatureDeriver};
use pricecast_core::forecast::forecast;

const INSTRUMENTS: [&str; 7] = ["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA"];

// ── Helpers ──────────────────────────────────────────────────────────

fn make_history(days: usize, offset: usize) -> SeriesDataset {
    let base_date = NaiveDate::from_ymd_opt(2019, 1, 2).unwrap();
    let bars = (offset..offset + days).flat_map(|i| {
        INSTRUMENTS.iter().enumerate().map(move |(k, inst)| {
            let close = 100.0 + k as f64 * 10.0 + (i as f64 * 0.1).sin() * 10.0;
            PriceBar {
                date: base_date + Duration::days(i as i64),
                instrument: inst.to_string(),
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000 + (i as u64 % 500_000),
            }
        })
    });
    SeriesDataset::from_unsorted(bars)
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for years in [1usize, 5] {
        let history = make_history(years * 365, 0);
        // Five-day increment overlapping the last two days.
        let increment = make_history(5, years * 365 - 2);
        group.bench_with_input(BenchmarkId::from_parameter(years), &years, |b, _| {
            b.iter(|| merge_with_report(black_box(&history), black_box(&increment)))
        });
    }
    group.finish();
}

fn bench_features(c: &mut Criterion) {
    let history = make_history(5 * 365, 0);
    let deriver = FeatureDeriver::new(FeatureConfig::default()).unwrap();
    c.bench_function("derive_all_5y", |b| {
        b.iter(|| deriver.derive_all(black_box(&history)))
    });
}

fn bench_forecast(c: &mut Criterion) {
    let series = make_history(5 * 365, 0).series("AAPL");
    c.bench_function("forecast_1825d", |b| {
        b.iter(|| forecast("AAPL", black_box(&series), 1825))
    });
}

criterion_group!(benches, bench_merge, bench_features, bench_forecast);
criterion_main!(benches);
