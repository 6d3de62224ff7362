//! Run state machine, run context and cancellation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stages of a run, in order, plus the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Fetch,
    Normalize,
    Merge,
    PersistHistory,
    DeriveFeatures,
    PersistFeatures,
    Forecast,
    PersistForecasts,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// The stage after this one on the success path. Terminal states stay put.
    pub fn next(self) -> RunState {
        match self {
            RunState::Fetch => RunState::Normalize,
            RunState::Normalize => RunState::Merge,
            RunState::Merge => RunState::PersistHistory,
            RunState::PersistHistory => RunState::DeriveFeatures,
            RunState::DeriveFeatures => RunState::PersistFeatures,
            RunState::PersistFeatures => RunState::Forecast,
            RunState::Forecast => RunState::PersistForecasts,
            RunState::PersistForecasts => RunState::Done,
            RunState::Done => RunState::Done,
            RunState::Failed => RunState::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Fetch => "FETCH",
            RunState::Normalize => "NORMALIZE",
            RunState::Merge => "MERGE",
            RunState::PersistHistory => "PERSIST_HISTORY",
            RunState::DeriveFeatures => "DERIVE_FEATURES",
            RunState::PersistFeatures => "PERSIST_FEATURES",
            RunState::Forecast => "FORECAST",
            RunState::PersistForecasts => "PERSIST_FORECASTS",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation flag, checked between instruments.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run inputs that are not configuration.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Logical date of the run; fetch windows end here and raw dumps are filed under it.
    pub run_date: NaiveDate,
    pub cancel: CancelToken,
}

impl RunContext {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            cancel: CancelToken::new(),
        }
    }
}
