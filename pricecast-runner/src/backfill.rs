//! Backfill: rebuild the master dataset from a long fetch.
//!
//! The only operation that truncates history. Instruments that fail to fetch
//! or normalize are left out; if none survive, the master is not touched.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use chrono::NaiveDate;
use pricecast_core::data::{normalize_batch, FetchPeriod, MarketDataProvider};
use pricecast_core::domain::SeriesDataset;
use pricecast_core::store::{wait_until_ready, HistoryMeta, HistoryStore, ObjectStore};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub period: FetchPeriod,
    pub end: NaiveDate,
    pub loaded: Vec<String>,
    /// Instrument → reason.
    pub skipped: BTreeMap<String, String>,
    pub meta: HistoryMeta,
}

/// Fetch `period` (default: the configured backfill period) ending at `end`
/// for every instrument and replace the master dataset with the result.
pub fn backfill(
    config: &PipelineConfig,
    provider: &dyn MarketDataProvider,
    store: &dyn ObjectStore,
    period: Option<FetchPeriod>,
    end: NaiveDate,
) -> Result<BackfillReport, PipelineError> {
    config.validate()?;
    let period = period.unwrap_or(config.backfill_period);
    let instruments = config.canonical_instruments()?;
    let buckets = config.buckets();
    wait_until_ready(store, &buckets, config.readiness_policy())?;

    info!(
        period = %period,
        end = %end,
        instruments = instruments.len(),
        provider = provider.name(),
        "backfill starting"
    );

    let mut skipped = BTreeMap::new();
    let mut bars = Vec::new();
    for (instrument, batch) in provider.fetch_bars(&instruments, period, end) {
        let normalized = batch
            .map_err(|e| e.to_string())
            .and_then(|raw| normalize_batch(&instrument, &raw).map_err(|e| e.to_string()));
        match normalized {
            Ok(batch) => {
                info!(instrument = %batch.instrument, bars = batch.bars.len(), "loaded");
                bars.extend(batch.bars);
            }
            Err(reason) => {
                warn!(instrument = %instrument, reason = %reason, "backfill skipped instrument");
                skipped.insert(instrument, reason);
            }
        }
    }

    let dataset = SeriesDataset::from_unsorted(bars);
    if dataset.is_empty() {
        return Err(PipelineError::AllInstrumentsFailed(instruments.len()));
    }

    let history = HistoryStore::new(
        store,
        config.history_bucket.as_str(),
        config.history_options(),
    );
    let meta = history.reinitialize(&dataset)?;

    Ok(BackfillReport {
        period,
        end,
        loaded: dataset.instruments(),
        skipped,
        meta,
    })
}
