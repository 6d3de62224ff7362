//! Merge-dedup of a historical dataset with newly ingested bars.
//!
//! Both inputs are canonical (sorted, unique), so the merge is a single
//! linear pass. On a `(date, instrument)` collision the incoming bar wins:
//! re-ingesting a date is idempotent and picks up source revisions.

use crate::domain::{PriceBar, SeriesDataset};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Row counts of one merge, for logging and the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Rows in the existing dataset.
    pub before: usize,
    /// Rows in the incoming batch.
    pub incoming: usize,
    /// Rows after dedup.
    pub after: usize,
    /// Existing rows superseded by an incoming row with the same key.
    pub replaced: usize,
}

impl MergeReport {
    /// Rows that were not present before.
    pub fn added(&self) -> usize {
        self.incoming - self.replaced
    }
}

/// Merge `incoming` into `existing`; neither input is mutated.
pub fn merge(existing: &SeriesDataset, incoming: &SeriesDataset) -> SeriesDataset {
    merge_with_report(existing, incoming).0
}

/// Merge and report row counts.
pub fn merge_with_report(
    existing: &SeriesDataset,
    incoming: &SeriesDataset,
) -> (SeriesDataset, MergeReport) {
    let mut report = MergeReport {
        before: existing.len(),
        incoming: incoming.len(),
        ..MergeReport::default()
    };

    if incoming.is_empty() {
        report.after = existing.len();
        return (existing.clone(), report);
    }

    let old = existing.bars();
    let new = incoming.bars();
    let mut out: Vec<PriceBar> = Vec::with_capacity(old.len() + new.len());
    let (mut i, mut j) = (0, 0);

    while i < old.len() && j < new.len() {
        match old[i].key().cmp(&new[j].key()) {
            Ordering::Less => {
                out.push(old[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                out.push(new[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                out.push(new[j].clone());
                report.replaced += 1;
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&old[i..]);
    out.extend_from_slice(&new[j..]);

    report.after = out.len();
    (SeriesDataset::from_canonical(out), report)
}
