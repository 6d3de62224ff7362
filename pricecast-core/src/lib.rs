//! PriceCast Core: domain types, ingestion, merge, indicators, forecasting, storage.
//!
//! This crate contains the data path of the daily pipeline:
//! - Domain types (price bars, datasets, feature and forecast records)
//! - Market data providers and the record normalizer
//! - Merge-dedup of new bars into the historical dataset
//! - CSV codec and the object store abstraction with its adapters
//! - Rolling indicators and the feature deriver
//! - Per-instrument linear trend forecasting

pub mod data;
pub mod domain;
pub mod features;
pub mod forecast;
pub mod indicators;
pub mod store;
