//! SeriesDataset: a canonical, deduplicated collection of price bars.
//!
//! Invariants held by every value of this type:
//! - unique on `(date, instrument)`
//! - sorted ascending by `(date, instrument)`
//!
//! Gaps (market holidays) are allowed. The only ways to build a dataset are
//! [`SeriesDataset::empty`], [`SeriesDataset::from_unsorted`] and the merge in
//! `data::merge`, all of which canonicalise.

use super::bar::PriceBar;
use super::ids::DatasetHash;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesDataset {
    bars: Vec<PriceBar>,
}

impl SeriesDataset {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Canonicalise an arbitrary sequence of bars.
    ///
    /// Later occurrences of a `(date, instrument)` key replace earlier ones.
    pub fn from_unsorted(bars: impl IntoIterator<Item = PriceBar>) -> Self {
        let mut by_key: BTreeMap<(NaiveDate, String), PriceBar> = BTreeMap::new();
        for bar in bars {
            by_key.insert((bar.date, bar.instrument.clone()), bar);
        }
        Self {
            bars: by_key.into_values().collect(),
        }
    }

    /// Wrap bars already known to be sorted and unique. Crate-internal.
    pub(crate) fn from_canonical(bars: Vec<PriceBar>) -> Self {
        debug_assert!(
            bars.windows(2).all(|w| w[0].key() < w[1].key()),
            "bars must be strictly ascending by (date, instrument)"
        );
        Self { bars }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<PriceBar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Sorted distinct instrument identifiers.
    pub fn instruments(&self) -> Vec<String> {
        self.bars
            .iter()
            .map(|b| b.instrument.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// First and last date across all instruments.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.bars.first()?.date, self.bars.last()?.date))
    }

    /// Split into per-instrument series, each sorted ascending by date.
    ///
    /// Windowed computations must run on these partitions so that one
    /// instrument's closes never leak into another's window.
    pub fn partition(&self) -> BTreeMap<String, Vec<PriceBar>> {
        let mut out: BTreeMap<String, Vec<PriceBar>> = BTreeMap::new();
        for bar in &self.bars {
            out.entry(bar.instrument.clone()).or_default().push(bar.clone());
        }
        out
    }

    /// The date-sorted series of one instrument.
    pub fn series(&self, instrument: &str) -> Vec<PriceBar> {
        self.bars
            .iter()
            .filter(|b| b.instrument == instrument)
            .cloned()
            .collect()
    }

    /// BLAKE3 hash over the JSON form of the rows.
    pub fn content_hash(&self) -> DatasetHash {
        // Serializing plain structs of numbers and strings cannot fail.
        let bytes = serde_json::to_vec(&self.bars).unwrap_or_default();
        DatasetHash(blake3::hash(&bytes).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, instrument: &str, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            instrument: instrument.into(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100,
        }
    }

    #[test]
    fn from_unsorted_sorts_by_date_then_instrument() {
        let ds = SeriesDataset::from_unsorted(vec![
            bar(3, "MSFT", 1.0),
            bar(1, "MSFT", 2.0),
            bar(1, "AAPL", 3.0),
            bar(2, "AAPL", 4.0),
        ]);
        let keys: Vec<_> = ds
            .bars()
            .iter()
            .map(|b| (b.date.format("%d").to_string(), b.instrument.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("01".to_string(), "AAPL".to_string()),
                ("01".to_string(), "MSFT".to_string()),
                ("02".to_string(), "AAPL".to_string()),
                ("03".to_string(), "MSFT".to_string()),
            ]
        );
    }

    #[test]
    fn from_unsorted_keeps_last_duplicate() {
        let ds = SeriesDataset::from_unsorted(vec![bar(1, "X", 100.0), bar(1, "X", 105.0)]);
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.bars()[0].close, 105.0);
    }

    #[test]
    fn partition_separates_instruments() {
        let ds = SeriesDataset::from_unsorted(vec![
            bar(1, "A", 1.0),
            bar(1, "B", 10.0),
            bar(2, "A", 2.0),
            bar(2, "B", 20.0),
        ]);
        let parts = ds.partition();
        assert_eq!(parts.len(), 2);
        let a: Vec<f64> = parts["A"].iter().map(|b| b.close).collect();
        let b: Vec<f64> = parts["B"].iter().map(|b| b.close).collect();
        assert_eq!(a, vec![1.0, 2.0]);
        assert_eq!(b, vec![10.0, 20.0]);
        assert_eq!(ds.instruments(), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn date_range_and_hash() {
        let ds = SeriesDataset::from_unsorted(vec![bar(5, "A", 1.0), bar(2, "A", 2.0)]);
        let (start, end) = ds.date_range().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());

        let same = SeriesDataset::from_unsorted(vec![bar(2, "A", 2.0), bar(5, "A", 1.0)]);
        assert_eq!(ds.content_hash(), same.content_hash());
        assert!(SeriesDataset::empty().date_range().is_none());
    }
}
