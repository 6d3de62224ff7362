//! Pipeline configuration.
//!
//! Loaded from TOML; every field has a default matching the daily job, so an
//! empty file is a valid configuration. The CLI applies environment overrides
//! on top (`PRICECAST_STORE_ROOT`, `PRICECAST_INSTRUMENTS`).

use pricecast_core::data::normalize::canonical_instrument;
use pricecast_core::data::{FetchPeriod, YahooSettings};
use pricecast_core::domain::ConfigHash;
use pricecast_core::features::{FeatureConfig, FeatureError};
use pricecast_core::forecast::MAX_HORIZON_DAYS;
use pricecast_core::store::{
    HistoryOptions, LocalObjectStore, ReadinessPolicy, DEFAULT_STALE_LOCK,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_STORE_ROOT: &str = "PRICECAST_STORE_ROOT";
pub const ENV_INSTRUMENTS: &str = "PRICECAST_INSTRUMENTS";

/// Upper bound for `provider.max_retries`.
pub const MAX_FETCH_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("invalid config TOML: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Windows(#[from] FeatureError),
}

/// Which market data source feeds the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Yahoo,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    /// Seed for the synthetic random walk.
    pub seed: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Yahoo,
            seed: 42,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl ProviderSettings {
    pub fn yahoo_settings(&self) -> YahooSettings {
        YahooSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            ..YahooSettings::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Root directory of the filesystem object store.
    pub root: PathBuf,
    pub ready_timeout_secs: u64,
    pub ready_interval_ms: u64,
    pub lock_timeout_secs: u64,
    /// A lock file older than this is left over from a killed run and is taken over.
    pub stale_lock_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            ready_timeout_secs: 30,
            ready_interval_ms: 500,
            lock_timeout_secs: 10,
            stale_lock_secs: DEFAULT_STALE_LOCK.as_secs(),
        }
    }
}

/// Everything a pipeline run needs besides the run date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub instruments: Vec<String>,
    /// Container for raw dumps, the master dataset and run summaries.
    pub history_bucket: String,
    pub feature_bucket: String,
    pub forecast_bucket: String,
    pub window_short: usize,
    pub window_long: usize,
    /// Calendar days projected past the last observed date.
    pub forecast_horizon_days: u32,
    pub fetch_period: FetchPeriod,
    pub backfill_period: FetchPeriod,
    pub tolerate_corrupt_history: bool,
    pub write_run_summary: bool,
    pub store: StoreSettings,
    pub provider: ProviderSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            instruments: ["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA"]
                .into_iter()
                .map(String::from)
                .collect(),
            history_bucket: "stock-data".into(),
            feature_bucket: "processed-data".into(),
            forecast_bucket: "predictions".into(),
            window_short: 20,
            window_long: 50,
            forecast_horizon_days: 1825,
            fetch_period: FetchPeriod::days(5),
            backfill_period: FetchPeriod::days(5 * 365),
            tolerate_corrupt_history: false,
            write_run_summary: true,
            store: StoreSettings::default(),
            provider: ProviderSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file. Does not validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::Invalid("instrument list is empty".into()));
        }
        let mut seen = BTreeSet::new();
        for raw in &self.instruments {
            let id = canonical_instrument(raw)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if !seen.insert(id.clone()) {
                return Err(ConfigError::Invalid(format!("duplicate instrument '{id}'")));
            }
        }

        for (field, bucket) in [
            ("history_bucket", &self.history_bucket),
            ("feature_bucket", &self.feature_bucket),
            ("forecast_bucket", &self.forecast_bucket),
        ] {
            if bucket.trim().is_empty() || bucket.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be a non-empty name without '/', got '{bucket}'"
                )));
            }
        }

        self.feature_config().validate()?;

        if self.forecast_horizon_days == 0 || self.forecast_horizon_days > MAX_HORIZON_DAYS {
            return Err(ConfigError::Invalid(format!(
                "forecast_horizon_days must be between 1 and {MAX_HORIZON_DAYS}, got {}",
                self.forecast_horizon_days
            )));
        }

        if self.store.stale_lock_secs <= self.store.lock_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "store.stale_lock_secs ({}) must exceed store.lock_timeout_secs ({})",
                self.store.stale_lock_secs, self.store.lock_timeout_secs
            )));
        }

        if self.provider.max_retries > MAX_FETCH_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "provider.max_retries must be at most {MAX_FETCH_RETRIES}, got {}",
                self.provider.max_retries
            )));
        }
        Ok(())
    }

    /// Canonical instrument ids, in configured order.
    pub fn canonical_instruments(&self) -> Result<Vec<String>, ConfigError> {
        self.instruments
            .iter()
            .map(|raw| {
                canonical_instrument(raw).map_err(|e| ConfigError::Invalid(e.to_string()))
            })
            .collect()
    }

    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            window_short: self.window_short,
            window_long: self.window_long,
        }
    }

    pub fn history_options(&self) -> HistoryOptions {
        HistoryOptions {
            tolerate_corrupt: self.tolerate_corrupt_history,
            lock_timeout: Duration::from_secs(self.store.lock_timeout_secs),
        }
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            timeout: Duration::from_secs(self.store.ready_timeout_secs),
            interval: Duration::from_millis(self.store.ready_interval_ms),
        }
    }

    /// Filesystem object store at `store.root`.
    pub fn local_store(&self) -> LocalObjectStore {
        LocalObjectStore::new(&self.store.root)
            .with_stale_after(Duration::from_secs(self.store.stale_lock_secs))
    }

    /// The three containers a run touches.
    pub fn buckets(&self) -> [&str; 3] {
        [
            &self.history_bucket,
            &self.feature_bucket,
            &self.forecast_bucket,
        ]
    }

    /// BLAKE3 over the JSON form of the config.
    pub fn config_hash(&self) -> Result<ConfigHash, ConfigError> {
        let json = serde_json::to_vec(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(ConfigHash(blake3::hash(&json).to_hex().to_string()))
    }

    /// Apply `PRICECAST_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(ENV_STORE_ROOT).filter(|v| !v.trim().is_empty()) {
            self.store.root = PathBuf::from(root.trim());
        }
        if let Some(list) = lookup(ENV_INSTRUMENTS).filter(|v| !v.trim().is_empty()) {
            self.instruments = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }
}
