//! Run-level errors. Per-instrument failures are `InstrumentOutcome::Skipped`
//! values, not errors; these abort the whole run.

use crate::config::ConfigError;
use pricecast_core::data::CodecError;
use pricecast_core::store::history::HistoryError;
use pricecast_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error in {path}: {message}")]
    Serialization { path: String, message: String },

    #[error("no instrument completed the run ({0} attempted)")]
    AllInstrumentsFailed(usize),
}

impl From<CodecError> for PipelineError {
    fn from(e: CodecError) -> Self {
        let path = match &e {
            CodecError::Malformed { path, .. } | CodecError::Header { path, .. } => path.clone(),
            CodecError::Encode(_) => String::from("<encode>"),
        };
        PipelineError::Serialization {
            path,
            message: e.to_string(),
        }
    }
}

impl From<HistoryError> for PipelineError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::Store(e) => PipelineError::Store(e),
            HistoryError::Codec(e) => e.into(),
            HistoryError::Meta { path, message } => PipelineError::Serialization { path, message },
        }
    }
}
