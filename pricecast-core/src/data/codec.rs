//! CSV codec for persisted datasets.
//!
//! Format: header row, one record per line, ISO-8601 dates, floats in plain
//! decimal notation (shortest representation that round-trips, never an
//! exponent). Output is byte-deterministic for equal inputs, so re-persisting
//! an unchanged dataset rewrites the same bytes.
//!
//! Columns:
//! - bars: `date,instrument,open,high,low,close,volume`
//! - features: bars + `sma_short,sma_long,volatility,daily_return_pct`
//! - forecasts: `instrument,date,predicted_close`

use crate::domain::{FeatureRecord, ForecastRecord, PriceBar};
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const BAR_HEADER: [&str; 7] = [
    "date",
    "instrument",
    "open",
    "high",
    "low",
    "close",
    "volume",
];

pub const FEATURE_HEADER: [&str; 11] = [
    "date",
    "instrument",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "sma_short",
    "sma_long",
    "volatility",
    "daily_return_pct",
];

pub const FORECAST_HEADER: [&str; 3] = ["instrument", "date", "predicted_close"];

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed data in {path} (record {record}): {message}")]
    Malformed {
        path: String,
        record: u64,
        message: String,
    },

    #[error("unexpected header in {path}: {found}")]
    Header { path: String, found: String },

    #[error("encode failed: {0}")]
    Encode(String),
}

fn num(v: f64) -> String {
    format!("{v}")
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, CodecError> {
    wtr.into_inner()
        .map_err(|e| CodecError::Encode(format!("failed to flush CSV writer: {e}")))
}

fn encode_err(e: csv::Error) -> CodecError {
    CodecError::Encode(e.to_string())
}

/// Encode price bars with a header row.
pub fn encode_bars(bars: &[PriceBar]) -> Result<Vec<u8>, CodecError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(BAR_HEADER).map_err(encode_err)?;
    for b in bars {
        wtr.write_record([
            b.date.to_string(),
            b.instrument.clone(),
            num(b.open),
            num(b.high),
            num(b.low),
            num(b.close),
            b.volume.to_string(),
        ])
        .map_err(encode_err)?;
    }
    finish(wtr)
}

/// Encode feature records with a header row.
pub fn encode_features(records: &[FeatureRecord]) -> Result<Vec<u8>, CodecError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(FEATURE_HEADER).map_err(encode_err)?;
    for r in records {
        wtr.write_record([
            r.date.to_string(),
            r.instrument.clone(),
            num(r.open),
            num(r.high),
            num(r.low),
            num(r.close),
            r.volume.to_string(),
            num(r.sma_short),
            num(r.sma_long),
            num(r.volatility),
            num(r.daily_return_pct),
        ])
        .map_err(encode_err)?;
    }
    finish(wtr)
}

/// Encode forecast records with a header row.
pub fn encode_forecasts(records: &[ForecastRecord]) -> Result<Vec<u8>, CodecError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(FORECAST_HEADER).map_err(encode_err)?;
    for r in records {
        wtr.write_record([r.instrument.clone(), r.date.to_string(), num(r.predicted_close)])
            .map_err(encode_err)?;
    }
    finish(wtr)
}

/// Decode rows, checking the header against `expected` first.
fn decode<T: DeserializeOwned>(
    bytes: &[u8],
    path: &str,
    expected: &[&str],
) -> Result<Vec<T>, CodecError> {
    let mut rdr = csv::Reader::from_reader(bytes);
    let headers = rdr.headers().map_err(|e| CodecError::Malformed {
        path: path.to_string(),
        record: 0,
        message: e.to_string(),
    })?;
    if headers.iter().ne(expected.iter().copied()) {
        return Err(CodecError::Header {
            path: path.to_string(),
            found: headers.iter().collect::<Vec<_>>().join(","),
        });
    }

    let mut out = Vec::new();
    for (i, row) in rdr.deserialize::<T>().enumerate() {
        let row = row.map_err(|e| CodecError::Malformed {
            path: path.to_string(),
            record: i as u64 + 1,
            message: e.to_string(),
        })?;
        out.push(row);
    }
    Ok(out)
}

/// Decode price bars. `path` is only used in error messages.
pub fn decode_bars(bytes: &[u8], path: &str) -> Result<Vec<PriceBar>, CodecError> {
    let bars: Vec<PriceBar> = decode(bytes, path, &BAR_HEADER)?;
    if let Some((i, _)) = bars.iter().enumerate().find(|(_, b)| b.is_void()) {
        return Err(CodecError::Malformed {
            path: path.to_string(),
            record: i as u64 + 1,
            message: "non-finite price".into(),
        });
    }
    Ok(bars)
}

pub fn decode_features(bytes: &[u8], path: &str) -> Result<Vec<FeatureRecord>, CodecError> {
    decode(bytes, path, &FEATURE_HEADER)
}

pub fn decode_forecasts(bytes: &[u8], path: &str) -> Result<Vec<ForecastRecord>, CodecError> {
    decode(bytes, path, &FORECAST_HEADER)
}
