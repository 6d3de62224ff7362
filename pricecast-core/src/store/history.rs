//! The historical store: the durable master dataset and its metadata sidecar.
//!
//! `processed/master.csv` is only rewritten under the `master` lock, and only
//! through `merge_and_persist` (append + dedup) or `reinitialize` (backfill).
//! The sidecar `processed/master.meta.json` records row counts, date range and
//! a BLAKE3 hash of the rows for `status` and drift checks.

use super::layout::{MASTER_LOCK, MASTER_META_PATH, MASTER_PATH};
use super::{ObjectStore, StoreError};
use crate::data::codec::{decode_bars, encode_bars, CodecError};
use crate::data::merge::{merge_with_report, MergeReport};
use crate::domain::SeriesDataset;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const QUARANTINE_SUFFIX: &str = ".quarantined";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("metadata sidecar {path}: {message}")]
    Meta { path: String, message: String },
}

/// Metadata sidecar written next to the master dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMeta {
    pub rows: usize,
    pub instruments: Vec<String>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub content_hash: String,
    pub written_at: DateTime<Utc>,
}

impl HistoryMeta {
    fn describe(dataset: &SeriesDataset) -> Self {
        let range = dataset.date_range();
        Self {
            rows: dataset.len(),
            instruments: dataset.instruments(),
            first_date: range.map(|r| r.0),
            last_date: range.map(|r| r.1),
            content_hash: dataset.content_hash().0,
            written_at: Utc::now(),
        }
    }

    /// Whether this sidecar matches `dataset` row for row.
    pub fn describes(&self, dataset: &SeriesDataset) -> bool {
        self.content_hash == dataset.content_hash().0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryOptions {
    /// Treat an undecodable master as empty (after quarantining it) instead of failing.
    pub tolerate_corrupt: bool,
    pub lock_timeout: Duration,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            tolerate_corrupt: false,
            lock_timeout: Duration::from_secs(10),
        }
    }
}

/// Store manager for the master dataset in one container.
pub struct HistoryStore<'a> {
    store: &'a dyn ObjectStore,
    container: String,
    options: HistoryOptions,
}

impl<'a> HistoryStore<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        container: impl Into<String>,
        options: HistoryOptions,
    ) -> Self {
        Self {
            store,
            container: container.into(),
            options,
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Load the master dataset. A missing blob is an empty history.
    pub fn load(&self) -> Result<SeriesDataset, HistoryError> {
        self.load_inner(false)
    }

    fn load_inner(&self, quarantine: bool) -> Result<SeriesDataset, HistoryError> {
        let Some(bytes) = self.store.read_optional(&self.container, MASTER_PATH)? else {
            debug!(container = %self.container, "no master dataset yet");
            return Ok(SeriesDataset::empty());
        };

        match decode_bars(&bytes, MASTER_PATH) {
            Ok(bars) => Ok(SeriesDataset::from_unsorted(bars)),
            Err(e) if self.options.tolerate_corrupt => {
                warn!(
                    path = MASTER_PATH,
                    error = %e,
                    "master dataset unreadable, starting from empty history"
                );
                if quarantine {
                    let target = format!("{MASTER_PATH}{QUARANTINE_SUFFIX}");
                    self.store.write(&self.container, &target, &bytes)?;
                    warn!(path = %target, "quarantined unreadable master dataset");
                }
                Ok(SeriesDataset::empty())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the metadata sidecar, if any.
    pub fn meta(&self) -> Result<Option<HistoryMeta>, HistoryError> {
        let Some(bytes) = self.store.read_optional(&self.container, MASTER_META_PATH)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| HistoryError::Meta {
                path: MASTER_META_PATH.to_string(),
                message: e.to_string(),
            })
    }

    /// Load, merge `incoming` (incoming wins), and persist, all under the master lock.
    ///
    /// Returns the merged dataset and the merge counts. Nothing is written if
    /// loading or encoding fails.
    pub fn merge_and_persist(
        &self,
        incoming: &SeriesDataset,
    ) -> Result<(SeriesDataset, MergeReport), HistoryError> {
        let _lock = self
            .store
            .lock(&self.container, MASTER_LOCK, self.options.lock_timeout)?;

        let existing = self.load_inner(true)?;
        let (merged, report) = merge_with_report(&existing, incoming);
        self.persist(&merged)?;

        info!(
            before = report.before,
            incoming = report.incoming,
            replaced = report.replaced,
            "merged {} rows -> {} rows",
            report.before + report.incoming,
            report.after
        );
        Ok((merged, report))
    }

    /// Replace the master dataset wholesale. Used by backfill.
    pub fn reinitialize(&self, dataset: &SeriesDataset) -> Result<HistoryMeta, HistoryError> {
        let _lock = self
            .store
            .lock(&self.container, MASTER_LOCK, self.options.lock_timeout)?;
        let meta = self.persist(dataset)?;
        info!(
            rows = meta.rows,
            instruments = meta.instruments.len(),
            "reinitialized master dataset"
        );
        Ok(meta)
    }

    /// Master blob first, then the sidecar.
    ///
    /// The master is the source of truth. If the sidecar write fails the call
    /// errors but the new master stays in place, and the old sidecar lags it
    /// until the next successful persist; `HistoryMeta::describes` detects that.
    fn persist(&self, dataset: &SeriesDataset) -> Result<HistoryMeta, HistoryError> {
        let bytes = encode_bars(dataset.bars())?;
        let meta = HistoryMeta::describe(dataset);
        let meta_json = serde_json::to_vec_pretty(&meta).map_err(|e| HistoryError::Meta {
            path: MASTER_META_PATH.to_string(),
            message: e.to_string(),
        })?;

        self.store.write(&self.container, MASTER_PATH, &bytes)?;
        self.store.write(&self.container, MASTER_META_PATH, &meta_json)?;
        debug!(rows = meta.rows, hash = %meta.content_hash, "persisted master dataset");
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceBar;
    use crate::store::MemoryObjectStore;

    const BUCKET: &str = "stock-data";

    fn bar(day: u32, inst: &str, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            instrument: inst.into(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1,
        }
    }

    fn mem() -> MemoryObjectStore {
        let s = MemoryObjectStore::new();
        s.ensure_container(BUCKET).unwrap();
        s
    }

    #[test]
    fn failed_sidecar_write_leaves_detectably_stale_meta() {
        let s = mem();
        let h = HistoryStore::new(&s, BUCKET, HistoryOptions::default());
        h.merge_and_persist(&SeriesDataset::from_unsorted(vec![bar(1, "X", 100.0)]))
            .unwrap();
        let first = h.load().unwrap();
        assert!(h.meta().unwrap().unwrap().describes(&first));

        s.fail_writes_under(BUCKET, MASTER_META_PATH);
        let err = h
            .merge_and_persist(&SeriesDataset::from_unsorted(vec![bar(2, "X", 101.0)]))
            .unwrap_err();
        assert!(matches!(err, HistoryError::Store(_)));

        let master = h.load().unwrap();
        assert_eq!(master.len(), 2);
        let meta = h.meta().unwrap().unwrap();
        assert_eq!(meta.rows, 1);
        assert!(!meta.describes(&master));
    }

    #[test]
    fn missing_master_loads_empty() {
        let s = mem();
        let h = HistoryStore::new(&s, BUCKET, HistoryOptions::default());
        assert!(h.load().unwrap().is_empty());
        assert!(h.meta().unwrap().is_none());
    }

    #[test]
    fn merge_and_persist_round_trips() {
        let s = mem();
        let h = HistoryStore::new(&s, BUCKET, HistoryOptions::default());
        h.merge_and_persist(&SeriesDataset::from_unsorted(vec![bar(1, "X", 100.0)]))
            .unwrap();
        let (merged, report) = h
            .merge_and_persist(&SeriesDataset::from_unsorted(vec![
                bar(1, "X", 105.0),
                bar(2, "X", 110.0),
            ]))
            .unwrap();

        assert_eq!(merged.bars(), &[bar(1, "X", 105.0), bar(2, "X", 110.0)]);
        assert_eq!(report.replaced, 1);
        assert_eq!(h.load().unwrap(), merged);

        let meta = h.meta().unwrap().unwrap();
        assert_eq!(meta.rows, 2);
        assert_eq!(meta.instruments, vec!["X".to_string()]);
        assert_eq!(meta.content_hash, merged.content_hash().0);
    }

    #[test]
    fn repeated_merge_is_byte_identical() {
        let s = mem();
        let h = HistoryStore::new(&s, BUCKET, HistoryOptions::default());
        let batch = SeriesDataset::from_unsorted(vec![bar(1, "X", 1.5), bar(1, "Y", 2.25)]);
        h.merge_and_persist(&batch).unwrap();
        let first = s.read(BUCKET, MASTER_PATH).unwrap();
        h.merge_and_persist(&batch).unwrap();
        assert_eq!(s.read(BUCKET, MASTER_PATH).unwrap(), first);
    }

    #[test]
    fn corrupt_master_is_an_error_by_default() {
        let s = mem();
        s.write(BUCKET, MASTER_PATH, b"garbage\n1,2\n").unwrap();
        let h = HistoryStore::new(&s, BUCKET, HistoryOptions::default());
        let err = h
            .merge_and_persist(&SeriesDataset::from_unsorted(vec![bar(1, "X", 1.0)]))
            .unwrap_err();
        assert!(matches!(err, HistoryError::Codec(_)));
        assert!(err.to_string().contains(MASTER_PATH));
        assert_eq!(s.read(BUCKET, MASTER_PATH).unwrap(), b"garbage\n1,2\n");
    }

    #[test]
    fn tolerated_corruption_is_quarantined() {
        let s = mem();
        s.write(BUCKET, MASTER_PATH, b"garbage\n").unwrap();
        let opts = HistoryOptions {
            tolerate_corrupt: true,
            ..HistoryOptions::default()
        };
        let h = HistoryStore::new(&s, BUCKET, opts);
        let (merged, _) = h
            .merge_and_persist(&SeriesDataset::from_unsorted(vec![bar(1, "X", 1.0)]))
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(
            s.read(BUCKET, "processed/master.csv.quarantined").unwrap(),
            b"garbage\n"
        );
    }

    #[test]
    fn failed_write_leaves_master_untouched() {
        let s = mem();
        let h = HistoryStore::new(&s, BUCKET, HistoryOptions::default());
        h.merge_and_persist(&SeriesDataset::from_unsorted(vec![bar(1, "X", 1.0)]))
            .unwrap();
        let before = s.read(BUCKET, MASTER_PATH).unwrap();

        s.fail_writes_under(BUCKET, "processed/");
        assert!(h
            .merge_and_persist(&SeriesDataset::from_unsorted(vec![bar(2, "X", 2.0)]))
            .is_err());
        assert_eq!(s.read(BUCKET, MASTER_PATH).unwrap(), before);
    }

    #[test]
    fn merge_fails_while_locked() {
        let s = mem();
        let opts = HistoryOptions {
            lock_timeout: Duration::from_millis(20),
            ..HistoryOptions::default()
        };
        let h = HistoryStore::new(&s, BUCKET, opts);
        let _held = s.lock(BUCKET, MASTER_LOCK, Duration::ZERO).unwrap();
        let err = h
            .merge_and_persist(&SeriesDataset::from_unsorted(vec![bar(1, "X", 1.0)]))
            .unwrap_err();
        assert!(matches!(err, HistoryError::Store(StoreError::Locked { .. })));
    }

    #[test]
    fn reinitialize_replaces_history() {
        let s = mem();
        let h = HistoryStore::new(&s, BUCKET, HistoryOptions::default());
        h.merge_and_persist(&SeriesDataset::from_unsorted(vec![bar(1, "OLD", 1.0)]))
            .unwrap();
        let fresh = SeriesDataset::from_unsorted(vec![bar(3, "NEW", 3.0)]);
        let meta = h.reinitialize(&fresh).unwrap();
        assert_eq!(meta.rows, 1);
        assert_eq!(h.load().unwrap(), fresh);
    }
}
