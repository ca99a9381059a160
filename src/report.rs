//! Run summary for the measurement retriever.
//!
//! Printed as a one-line result on success and optionally saved as JSON
//! next to the output for record keeping.

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::NwisError;
use crate::table::io_error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub total: usize,
    pub with_data: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub sites_requested: usize,
    pub batch_size: usize,
    pub levels: BatchCounts,
    pub site_info: BatchCounts,
    /// Labels of batches whose request failed and was skipped.
    pub skipped_batches: Vec<String>,
    pub rows_joined: usize,
    pub rows_written: usize,
    pub output: String,
}

impl RunSummary {
    pub fn new(sites_requested: usize, batch_size: usize) -> Self {
        RunSummary {
            timestamp: Utc::now().to_rfc3339(),
            sites_requested,
            batch_size,
            levels: BatchCounts::default(),
            site_info: BatchCounts::default(),
            skipped_batches: Vec::new(),
            rows_joined: 0,
            rows_written: 0,
            output: String::new(),
        }
    }

    /// The one line printed after a successful run.
    pub fn headline(&self) -> String {
        format!("Wrote {} rows to {}", self.rows_written, self.output)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), NwisError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| NwisError::ParseError(format!("cannot serialize run summary: {}", e)))?;
        fs::write(path, json).map_err(|e| io_error(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headline_reports_rows_and_path() {
        let mut summary = RunSummary::new(3, 2);
        summary.rows_written = 5;
        summary.output = "levels.csv".to_string();
        assert_eq!(summary.headline(), "Wrote 5 rows to levels.csv");
    }

    #[test]
    fn test_summary_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");

        let mut summary = RunSummary::new(3, 2);
        summary.levels = BatchCounts { total: 2, with_data: 1, failed: 0 };
        summary.write_json(&path).expect("summary should be written");

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: RunSummary = serde_json::from_str(&text).expect("summary JSON should parse");
        assert_eq!(parsed, summary);
    }
}
