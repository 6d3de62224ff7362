//! End to end on the filesystem store: backfill, daily run, status, forecast query.

use chrono::NaiveDate;
use pricecast_core::data::{FetchPeriod, SyntheticProvider};
use pricecast_core::store::layout::MASTER_LOCK;
use pricecast_core::store::{LocalObjectStore, ObjectStore, StoreError};
use pricecast_runner::{
    backfill, collect_status, load_forecasts, Pipeline, PipelineConfig, PipelineError,
    RunContext, RunState,
};
use std::time::Duration;

fn config(root: &std::path::Path) -> PipelineConfig {
    let mut cfg = PipelineConfig::from_toml(
        r#"
        instruments = ["AAPL", "MSFT", "NVDA"]
        forecast_horizon_days = 30

        [provider]
        kind = "synthetic"
        seed = 11
        "#,
    )
    .unwrap();
    cfg.store.root = root.to_path_buf();
    cfg
}

#[test]
fn backfill_then_daily_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let store = LocalObjectStore::new(&cfg.store.root);
    let provider = SyntheticProvider::new(cfg.provider.seed);

    let backfill_end = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
    let report = backfill(
        &cfg,
        &provider,
        &store,
        Some(FetchPeriod::days(365)),
        backfill_end,
    )
    .unwrap();
    assert_eq!(report.loaded.len(), 3);

    let run_date = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
    let pipeline = Pipeline::new(&cfg, &provider, &store).unwrap();
    let summary = pipeline.run(&RunContext::new(run_date)).unwrap();
    assert_eq!(summary.state, RunState::Done);
    assert_eq!(summary.succeeded(), 3);
    // A new trading week on top of the backfill.
    let merge = summary.merge.unwrap();
    assert_eq!(merge.replaced, 0);
    assert_eq!(merge.added(), 15);

    let status = collect_status(&cfg, &store).unwrap();
    assert_eq!(status.history_rows, report.meta.rows + 15);
    assert!(status.meta_current);
    assert_eq!(status.instruments.len(), 3);
    assert!(status.instruments.iter().all(|s| s.has_forecast));
    assert!(status.instruments.iter().all(|s| s.last_date == Some(run_date)));
    assert_eq!(status.raw_dates, vec!["2024-06-28".to_string()]);
    assert_eq!(status.runs, vec!["2024-06-28".to_string()]);
    assert!(status.render().contains("AAPL"));

    let head = load_forecasts(&cfg, &store, "MSFT", Some(5)).unwrap();
    assert_eq!(head.len(), 5);
    assert_eq!(head[0].date, NaiveDate::from_ymd_opt(2024, 6, 29).unwrap());
}

#[test]
fn status_of_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let store = LocalObjectStore::new(&cfg.store.root);
    let status = collect_status(&cfg, &store).unwrap();
    assert_eq!(status.history_rows, 0);
    assert!(status.instruments.is_empty());
}

#[test]
fn run_recovers_from_a_lock_left_by_a_killed_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.store.lock_timeout_secs = 0;
    let provider = SyntheticProvider::new(cfg.provider.seed);
    let run_date = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();

    let store = cfg.local_store();
    store.ensure_container(&cfg.history_bucket).unwrap();
    // A guard that is never dropped leaves the lock file behind, as a crash would.
    std::mem::forget(
        store
            .lock(&cfg.history_bucket, MASTER_LOCK, Duration::ZERO)
            .unwrap(),
    );

    let blocked = Pipeline::new(&cfg, &provider, &store)
        .unwrap()
        .run(&RunContext::new(run_date));
    assert!(matches!(
        blocked,
        Err(PipelineError::Store(StoreError::Locked { .. }))
    ));

    // Once the lock counts as stale, the next run takes it over.
    let store = store.with_stale_after(Duration::ZERO);
    let summary = Pipeline::new(&cfg, &provider, &store)
        .unwrap()
        .run(&RunContext::new(run_date))
        .unwrap();
    assert_eq!(summary.state, RunState::Done);
    assert!(!dir
        .path()
        .join("stock-data")
        .join(".locks")
        .join("master.lock")
        .exists());
}
