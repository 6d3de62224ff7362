//! PriceCast Runner: daily pipeline orchestration.
//!
//! This crate builds on `pricecast-core` to provide:
//! - Pipeline configuration (TOML, defaults, environment overrides)
//! - The run coordinator and its state machine
//! - Run summaries with per-instrument outcomes
//! - Backfill (history reinitialization)
//! - Read-only status and forecast queries

pub mod backfill;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod state;
pub mod status;
pub mod summary;

pub use backfill::{backfill, BackfillReport};
pub use config::{ConfigError, PipelineConfig, ProviderKind, ProviderSettings, StoreSettings};
pub use coordinator::Pipeline;
pub use error::PipelineError;
pub use state::{CancelToken, RunContext, RunState};
pub use status::{collect_status, load_forecasts, InstrumentStatus, StoreStatus};
pub use summary::{InstrumentOutcome, RunSummary};
