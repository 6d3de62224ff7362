//! Object paths used by the pipeline.
//!
//! History container: `raw/{date}/{instrument}.csv`, `processed/master.csv`,
//! `processed/master.meta.json`, `runs/{date}.json`.
//! Feature container: `processed/{instrument}.csv`.
//! Forecast container: `predictions/{instrument}.csv`.

use chrono::NaiveDate;

pub const MASTER_PATH: &str = "processed/master.csv";
pub const MASTER_META_PATH: &str = "processed/master.meta.json";
pub const RAW_PREFIX: &str = "raw";
pub const RUNS_PREFIX: &str = "runs";

/// Lock name guarding the master dataset's read-merge-write.
pub const MASTER_LOCK: &str = "master";

pub fn raw_path(date: NaiveDate, instrument: &str) -> String {
    format!("{RAW_PREFIX}/{date}/{instrument}.csv")
}

pub fn feature_path(instrument: &str) -> String {
    format!("processed/{instrument}.csv")
}

pub fn forecast_path(instrument: &str) -> String {
    format!("predictions/{instrument}.csv")
}

pub fn run_summary_path(date: NaiveDate) -> String {
    format!("{RUNS_PREFIX}/{date}.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_stable() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(raw_path(d, "AAPL"), "raw/2024-01-02/AAPL.csv");
        assert_eq!(feature_path("MSFT"), "processed/MSFT.csv");
        assert_eq!(forecast_path("TSLA"), "predictions/TSLA.csv");
        assert_eq!(run_summary_path(d), "runs/2024-01-02.json");
    }
}
