//! Read-only views of the store for the `status` and `forecast` commands.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use chrono::NaiveDate;
use pricecast_core::data::codec::decode_forecasts;
use pricecast_core::domain::ForecastRecord;
use pricecast_core::store::layout::{forecast_path, RAW_PREFIX, RUNS_PREFIX};
use pricecast_core::store::{HistoryMeta, HistoryStore, ObjectStore};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentStatus {
    pub instrument: String,
    pub rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub has_forecast: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStatus {
    pub history_rows: usize,
    pub meta: Option<HistoryMeta>,
    /// The sidecar matches the master (false after a failed sidecar write).
    pub meta_current: bool,
    pub instruments: Vec<InstrumentStatus>,
    /// Dates with raw dumps, ascending.
    pub raw_dates: Vec<String>,
    /// Stored run summaries, ascending.
    pub runs: Vec<String>,
}

impl StoreStatus {
    pub fn render(&self) -> String {
        let mut out = format!("master: {} rows", self.history_rows);
        if let Some(meta) = &self.meta {
            out.push_str(&format!(
                " (hash {}, written {})",
                &meta.content_hash[..meta.content_hash.len().min(12)],
                meta.written_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            if !self.meta_current {
                out.push_str(" [sidecar stale]");
            }
        }
        out.push('\n');
        for s in &self.instruments {
            let range = match (s.first_date, s.last_date) {
                (Some(a), Some(b)) => format!("{a} .. {b}"),
                _ => "-".to_string(),
            };
            out.push_str(&format!(
                "  {:<8} {:>6} rows  {}  forecast={}\n",
                s.instrument,
                s.rows,
                range,
                if s.has_forecast { "yes" } else { "no" }
            ));
        }
        out.push_str(&format!(
            "raw dumps: {}  run summaries: {}\n",
            self.raw_dates.len(),
            self.runs.len()
        ));
        if let Some(last) = self.raw_dates.last() {
            out.push_str(&format!("latest raw dump: {last}\n"));
        }
        out
    }
}

/// Summarize what the store holds. Missing containers read as empty.
pub fn collect_status(
    config: &PipelineConfig,
    store: &dyn ObjectStore,
) -> Result<StoreStatus, PipelineError> {
    store.ping()?;
    let history_bucket = config.history_bucket.as_str();
    if !store.container_exists(history_bucket)? {
        return Ok(StoreStatus {
            history_rows: 0,
            meta: None,
            meta_current: false,
            instruments: Vec::new(),
            raw_dates: Vec::new(),
            runs: Vec::new(),
        });
    }

    let history = HistoryStore::new(store, history_bucket, config.history_options());
    let master = history.load()?;
    let meta = history.meta()?;
    let meta_current = meta.as_ref().is_some_and(|m| m.describes(&master));
    let forecasts_exist = store.container_exists(&config.forecast_bucket)?;

    let mut instruments = Vec::new();
    for (instrument, series) in master.partition() {
        let has_forecast =
            forecasts_exist && store.exists(&config.forecast_bucket, &forecast_path(&instrument))?;
        instruments.push(InstrumentStatus {
            rows: series.len(),
            first_date: series.first().map(|b| b.date),
            last_date: series.last().map(|b| b.date),
            has_forecast,
            instrument,
        });
    }

    let runs = store
        .list(history_bucket, RUNS_PREFIX)?
        .into_iter()
        .filter_map(|p| {
            p.strip_prefix("runs/")
                .and_then(|name| name.strip_suffix(".json"))
                .map(String::from)
        })
        .collect();

    Ok(StoreStatus {
        history_rows: master.len(),
        meta,
        meta_current,
        instruments,
        raw_dates: store.list_dirs(history_bucket, RAW_PREFIX)?,
        runs,
    })
}

/// Stored forecast for one instrument; the first `limit` rows when given.
pub fn load_forecasts(
    config: &PipelineConfig,
    store: &dyn ObjectStore,
    instrument: &str,
    limit: Option<usize>,
) -> Result<Vec<ForecastRecord>, PipelineError> {
    let path = forecast_path(instrument);
    let bytes = store.read(&config.forecast_bucket, &path)?;
    let mut records = decode_forecasts(&bytes, &path)?;
    if let Some(n) = limit {
        records.truncate(n);
    }
    Ok(records)
}
