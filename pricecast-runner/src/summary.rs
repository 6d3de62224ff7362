//! Run summary: what happened to each instrument, and the merge counts.

use crate::error::PipelineError;
use crate::state::RunState;
use chrono::{DateTime, NaiveDate, Utc};
use pricecast_core::data::MergeReport;
use pricecast_core::domain::{ConfigHash, TrendDirection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstrumentOutcome {
    Succeeded {
        features: usize,
        forecasts: usize,
        slope: f64,
        direction: TrendDirection,
    },
    Skipped {
        stage: RunState,
        reason: String,
    },
}

impl InstrumentOutcome {
    pub fn skipped(stage: RunState, reason: impl Into<String>) -> Self {
        InstrumentOutcome::Skipped {
            stage,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InstrumentOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_date: NaiveDate,
    pub state: RunState,
    pub cancelled: bool,
    pub provider: String,
    pub config_hash: ConfigHash,
    /// Absent when no instrument reached the merge.
    pub merge: Option<MergeReport>,
    /// Content hash of the master dataset after the merge.
    pub dataset_hash: Option<String>,
    pub outcomes: BTreeMap<String, InstrumentOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_done(&self) -> bool {
        self.state == RunState::Done
    }

    /// `Err(AllInstrumentsFailed)` unless the run finished `DONE`.
    pub fn ensure_done(&self) -> Result<(), PipelineError> {
        if self.is_done() {
            Ok(())
        } else {
            Err(PipelineError::AllInstrumentsFailed(self.outcomes.len()))
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec_pretty(self).map_err(|e| PipelineError::Serialization {
            path: "run summary".into(),
            message: e.to_string(),
        })
    }

    /// Human-readable report, one line per instrument.
    pub fn render(&self) -> String {
        let mut out = format!(
            "run {}  state={}  succeeded={}  skipped={}{}\n",
            self.run_date,
            self.state,
            self.succeeded(),
            self.skipped(),
            if self.cancelled { "  (cancelled)" } else { "" }
        );
        if let Some(m) = &self.merge {
            out.push_str(&format!(
                "  merge: {} existing + {} incoming -> {} rows ({} replaced)\n",
                m.before, m.incoming, m.after, m.replaced
            ));
        }
        for (instrument, outcome) in &self.outcomes {
            let line = match outcome {
                InstrumentOutcome::Succeeded {
                    features,
                    forecasts,
                    slope,
                    direction,
                } => format!(
                    "  {instrument:<8} ok       features={features} forecasts={forecasts} \
                     slope={slope:.4}/day ({direction})"
                ),
                InstrumentOutcome::Skipped { stage, reason } => {
                    format!("  {instrument:<8} skipped  at {stage}: {reason}")
                }
            };
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(outcomes: Vec<(&str, InstrumentOutcome)>, state: RunState) -> RunSummary {
        let now = Utc::now();
        RunSummary {
            run_date: NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
            state,
            cancelled: false,
            provider: "static".into(),
            config_hash: ConfigHash("abc".into()),
            merge: Some(MergeReport {
                before: 10,
                incoming: 5,
                after: 13,
                replaced: 2,
            }),
            dataset_hash: None,
            outcomes: outcomes
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            started_at: now,
            finished_at: now,
        }
    }

    fn ok() -> InstrumentOutcome {
        InstrumentOutcome::Succeeded {
            features: 3,
            forecasts: 30,
            slope: 0.25,
            direction: TrendDirection::Up,
        }
    }

    #[test]
    fn counts_and_done_check() {
        let s = summary(
            vec![
                ("AAPL", ok()),
                ("META", InstrumentOutcome::skipped(RunState::Fetch, "timeout")),
            ],
            RunState::Done,
        );
        assert_eq!(s.succeeded(), 1);
        assert_eq!(s.skipped(), 1);
        assert!(s.ensure_done().is_ok());

        let failed = summary(vec![], RunState::Failed);
        assert!(matches!(
            failed.ensure_done(),
            Err(PipelineError::AllInstrumentsFailed(0))
        ));
    }

    #[test]
    fn json_shape() {
        let s = summary(
            vec![("META", InstrumentOutcome::skipped(RunState::Normalize, "empty"))],
            RunState::Failed,
        );
        let v: serde_json::Value = serde_json::from_slice(&s.to_json().unwrap()).unwrap();
        assert_eq!(v["state"], "FAILED");
        assert_eq!(v["outcomes"]["META"]["status"], "skipped");
        assert_eq!(v["outcomes"]["META"]["stage"], "NORMALIZE");
        assert_eq!(v["merge"]["replaced"], 2);
    }

    #[test]
    fn render_lists_every_instrument() {
        let s = summary(
            vec![
                ("AAPL", ok()),
                ("TSLA", InstrumentOutcome::skipped(RunState::Forecast, "1 date")),
            ],
            RunState::Done,
        );
        let text = s.render();
        assert!(text.contains("state=DONE"));
        assert!(text.contains("AAPL"));
        assert!(text.contains("skipped  at FORECAST: 1 date"));
        assert!(text.contains("13 rows (2 replaced)"));
    }
}
