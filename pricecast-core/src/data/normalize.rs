//! Record normalizer: raw provider bars → canonical `PriceBar` records.
//!
//! Pure transform. Rules:
//! - instrument ids are trimmed and upper-cased
//! - blank rows (every price missing) are dropped silently
//! - insane rows (non-finite or non-positive close, inverted OHLC range) are
//!   dropped and counted
//! - within one batch a repeated date keeps its last occurrence
//! - output is sorted ascending by date
//!
//! A batch with no surviving bars is `NormalizeError::EmptySeries`.

use super::provider::RawBar;
use crate::domain::PriceBar;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NormalizeError {
    #[error("no usable bars for {instrument} ({dropped} malformed)")]
    EmptySeries { instrument: String, dropped: usize },

    #[error("invalid instrument identifier '{0}'")]
    InvalidInstrument(String),
}

/// Normalized bars for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub instrument: String,
    pub bars: Vec<PriceBar>,
    /// Rows rejected as malformed (blank holiday rows are not counted).
    pub dropped: usize,
}

/// Canonical form of an instrument identifier.
pub fn canonical_instrument(raw: &str) -> Result<String, NormalizeError> {
    let id = raw.trim().to_ascii_uppercase();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=' | '_'));
    if valid {
        Ok(id)
    } else {
        Err(NormalizeError::InvalidInstrument(raw.to_string()))
    }
}

/// Normalize one instrument's raw batch.
pub fn normalize_batch(
    instrument: &str,
    raw: &[RawBar],
) -> Result<NormalizedBatch, NormalizeError> {
    let instrument = canonical_instrument(instrument)?;
    let mut by_date: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();
    let mut dropped = 0;

    for r in raw {
        if r.is_blank() {
            continue;
        }
        let bar = PriceBar {
            date: r.date,
            instrument: instrument.clone(),
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
        };
        if !bar.is_sane() {
            dropped += 1;
            continue;
        }
        by_date.insert(bar.date, bar);
    }

    if dropped > 0 {
        warn!(instrument = %instrument, dropped, "dropped malformed bars");
    }

    if by_date.is_empty() {
        return Err(NormalizeError::EmptySeries {
            instrument,
            dropped,
        });
    }

    Ok(NormalizedBatch {
        instrument,
        bars: by_date.into_values().collect(),
        dropped,
    })
}
