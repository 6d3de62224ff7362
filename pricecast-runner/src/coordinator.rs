//! Pipeline coordinator: one daily run from fetch to persisted forecasts.
//!
//! FETCH → NORMALIZE → MERGE → PERSIST_HISTORY → DERIVE_FEATURES →
//! PERSIST_FEATURES → FORECAST → PERSIST_FORECASTS → DONE | FAILED
//!
//! Per-instrument failures become `InstrumentOutcome::Skipped` and drop the
//! instrument from later stages. Store failures around the master dataset
//! abort the run with an error; the master is written atomically under its
//! lock, so an aborted run never leaves a partial merge behind.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::state::{RunContext, RunState};
use crate::summary::{InstrumentOutcome, RunSummary};
use chrono::Utc;
use pricecast_core::data::codec::{encode_bars, encode_features, encode_forecasts};
use pricecast_core::data::{normalize_batch, MarketDataProvider};
use pricecast_core::domain::{ConfigHash, PriceBar, SeriesDataset};
use pricecast_core::features::FeatureDeriver;
use pricecast_core::forecast::forecast;
use pricecast_core::store::layout::{feature_path, forecast_path, raw_path, run_summary_path};
use pricecast_core::store::{wait_until_ready, HistoryStore, ObjectStore};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Wires a provider and a store to a validated configuration.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    provider: &'a dyn MarketDataProvider,
    store: &'a dyn ObjectStore,
    instruments: Vec<String>,
    deriver: FeatureDeriver,
    config_hash: ConfigHash,
}

/// Mutable bookkeeping for one run.
struct RunLog {
    state: RunState,
    outcomes: BTreeMap<String, InstrumentOutcome>,
    cancelled: bool,
}

impl RunLog {
    fn enter(&mut self, state: RunState) {
        debug!(from = %self.state, to = %state, "stage transition");
        self.state = state;
    }

    /// Move to the next stage on the success path.
    fn advance(&mut self) -> RunState {
        let next = self.state.next();
        self.enter(next);
        next
    }

    fn skip(&mut self, instrument: &str, stage: RunState, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(instrument, stage = %stage, reason = %reason, "instrument skipped");
        self.outcomes
            .insert(instrument.to_string(), InstrumentOutcome::skipped(stage, reason));
    }

    /// Check the cancel flag; on cancellation skip `pending` at `stage`.
    fn check_cancel<'i>(
        &mut self,
        ctx: &RunContext,
        stage: RunState,
        pending: impl IntoIterator<Item = &'i String>,
    ) -> bool {
        if !ctx.cancel.is_cancelled() {
            return false;
        }
        if !self.cancelled {
            warn!(stage = %stage, "run cancelled");
        }
        self.cancelled = true;
        for instrument in pending {
            self.outcomes.entry(instrument.clone()).or_insert_with(|| {
                InstrumentOutcome::skipped(stage, "run cancelled")
            });
        }
        true
    }
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        provider: &'a dyn MarketDataProvider,
        store: &'a dyn ObjectStore,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let deriver = FeatureDeriver::new(config.feature_config())
            .map_err(crate::config::ConfigError::from)?;
        Ok(Self {
            config,
            provider,
            store,
            instruments: config.canonical_instruments()?,
            deriver,
            config_hash: config.config_hash()?,
        })
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    /// Execute one run.
    ///
    /// `Ok` carries the summary for both `DONE` and `FAILED`; `Err` means the
    /// store could not be used and nothing about the master dataset changed.
    pub fn run(&self, ctx: &RunContext) -> Result<RunSummary, PipelineError> {
        let started_at = Utc::now();
        info!(
            run_date = %ctx.run_date,
            provider = self.provider.name(),
            instruments = self.instruments.len(),
            config = %self.config_hash,
            "pipeline run starting"
        );

        let buckets = self.config.buckets();
        wait_until_ready(self.store, &buckets, self.config.readiness_policy())?;

        let mut log = RunLog {
            state: RunState::Fetch,
            outcomes: BTreeMap::new(),
            cancelled: false,
        };

        let incoming = self.ingest(ctx, &mut log);

        let mut merge = None;
        let mut dataset_hash = None;
        if !incoming.is_empty() && !log.cancelled {
            log.advance();
            let history = HistoryStore::new(
                self.store,
                self.config.history_bucket.as_str(),
                self.config.history_options(),
            );
            log.advance();
            let (master, report) = history.merge_and_persist(&incoming)?;
            merge = Some(report);
            dataset_hash = Some(master.content_hash().0);

            let merged: Vec<String> = incoming.instruments();
            let partitions = master.partition();
            self.derive_and_forecast(ctx, &mut log, &merged, &partitions);
        }

        let succeeded = log.outcomes.values().filter(|o| o.is_success()).count();
        let state = if succeeded > 0 {
            RunState::Done
        } else {
            RunState::Failed
        };
        log.enter(state);

        let summary = RunSummary {
            run_date: ctx.run_date,
            state,
            cancelled: log.cancelled,
            provider: self.provider.name().to_string(),
            config_hash: self.config_hash.clone(),
            merge,
            dataset_hash,
            outcomes: log.outcomes,
            started_at,
            finished_at: Utc::now(),
        };

        if self.config.write_run_summary {
            let path = run_summary_path(ctx.run_date);
            self.store
                .write(&self.config.history_bucket, &path, &summary.to_json()?)?;
            debug!(path = %path, "wrote run summary");
        }

        info!(
            state = %summary.state,
            succeeded = summary.succeeded(),
            skipped = summary.skipped(),
            "pipeline run finished"
        );
        Ok(summary)
    }

    /// FETCH and NORMALIZE, plus the per-run raw dumps.
    fn ingest(&self, ctx: &RunContext, log: &mut RunLog) -> SeriesDataset {
        if log.check_cancel(ctx, RunState::Fetch, &self.instruments) {
            return SeriesDataset::empty();
        }
        let mut batches = self
            .provider
            .fetch_bars(&self.instruments, self.config.fetch_period, ctx.run_date);
        info!(
            period = %self.config.fetch_period,
            batches = batches.len(),
            "fetched market data"
        );

        let stage = log.advance();
        let mut bars: Vec<PriceBar> = Vec::new();
        for instrument in &self.instruments {
            // Nothing is merged after a cancel, so every instrument ends up skipped.
            if log.check_cancel(ctx, stage, &self.instruments) {
                return SeriesDataset::empty();
            }

            let raw = match batches.remove(instrument) {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    log.skip(instrument, RunState::Fetch, e.to_string());
                    continue;
                }
                None => {
                    log.skip(instrument, RunState::Fetch, "provider returned no batch");
                    continue;
                }
            };

            let batch = match normalize_batch(instrument, &raw) {
                Ok(batch) => batch,
                Err(e) => {
                    log.skip(instrument, stage, e.to_string());
                    continue;
                }
            };

            let path = raw_path(ctx.run_date, &batch.instrument);
            let dumped = encode_bars(&batch.bars)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    self.store
                        .write(&self.config.history_bucket, &path, &bytes)
                        .map_err(|e| e.to_string())
                });
            if let Err(reason) = dumped {
                log.skip(instrument, stage, format!("raw dump failed: {reason}"));
                continue;
            }

            debug!(
                instrument = %batch.instrument,
                bars = batch.bars.len(),
                path = %path,
                "normalized"
            );
            bars.extend(batch.bars);
        }

        SeriesDataset::from_unsorted(bars)
    }

    /// DERIVE_FEATURES through PERSIST_FORECASTS, one instrument at a time.
    fn derive_and_forecast(
        &self,
        ctx: &RunContext,
        log: &mut RunLog,
        instruments: &[String],
        partitions: &BTreeMap<String, Vec<PriceBar>>,
    ) {
        let stage = log.advance();
        for (i, instrument) in instruments.iter().enumerate() {
            if log.check_cancel(ctx, stage, &instruments[i..]) {
                return;
            }
            let Some(series) = partitions.get(instrument) else {
                log.skip(instrument, stage, "missing from master dataset");
                continue;
            };
            if let Some(outcome) = self.process_instrument(instrument, series, log) {
                info!(instrument = %instrument, "instrument complete");
                log.outcomes.insert(instrument.clone(), outcome);
            }
        }
    }

    fn process_instrument(
        &self,
        instrument: &str,
        series: &[PriceBar],
        log: &mut RunLog,
    ) -> Option<InstrumentOutcome> {
        let features = self.deriver.derive(series);
        if features.is_empty() {
            debug!(
                instrument,
                bars = series.len(),
                window = self.config.window_long,
                "history shorter than the long window, no feature rows"
            );
        }

        let path = feature_path(instrument);
        let written = encode_features(&features)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                self.store
                    .write(&self.config.feature_bucket, &path, &bytes)
                    .map_err(|e| e.to_string())
            });
        if let Err(reason) = written {
            log.skip(instrument, RunState::PersistFeatures, reason);
            return None;
        }

        let fc = match forecast(instrument, series, self.config.forecast_horizon_days) {
            Ok(fc) => fc,
            Err(e) => {
                log.skip(instrument, RunState::Forecast, e.to_string());
                return None;
            }
        };
        info!(
            instrument,
            slope = fc.model.slope,
            direction = %fc.model.direction(),
            observations = fc.model.observations,
            "fitted trend"
        );

        let path = forecast_path(instrument);
        let written = encode_forecasts(&fc.records)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                self.store
                    .write(&self.config.forecast_bucket, &path, &bytes)
                    .map_err(|e| e.to_string())
            });
        if let Err(reason) = written {
            log.skip(instrument, RunState::PersistForecasts, reason);
            return None;
        }

        Some(InstrumentOutcome::Succeeded {
            features: features.len(),
            forecasts: fc.records.len(),
            slope: fc.model.slope,
            direction: fc.model.direction(),
        })
    }
}
