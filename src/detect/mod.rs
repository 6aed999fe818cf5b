//! Anomaly detection for reconciliation time series.
//!
//! One batch flows through feature engineering, rule labeling, categorical
//! encoding, a per-batch gradient-boosted classifier, and comment synthesis.
//! Nothing here outlives the call that scores the batch.

pub mod comment;
pub mod encode;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod rules;
pub mod split;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::ingest::{self, IngestError, COL_COMMENTS, COL_PREDICTED_ANOMALY};

pub use self::comment::Comment;
pub use self::pipeline::detect_anomalies;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("training partition holds only {class} labels ({rows} rows); cannot fit a two-class model")]
    InsufficientLabelDiversity { class: &'static str, rows: usize },
}

impl DetectError {
    /// Stable machine-readable kind reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            DetectError::InsufficientLabelDiversity { .. } => "InsufficientLabelDiversity",
        }
    }
}

/// An input row with its prediction and comment attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    /// Verbatim input cells, in input column order.
    pub cells: Vec<String>,
    pub predicted_anomaly: bool,
    pub comment: Comment,
}

impl ScoredRow {
    pub fn predicted_label(&self) -> &'static str {
        if self.predicted_anomaly {
            "Yes"
        } else {
            "No"
        }
    }
}

/// The scored output of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBatch {
    pub input_headers: Vec<String>,
    pub rows: Vec<ScoredRow>,
}

impl ScoredBatch {
    /// Input headers followed by `Predicted Anomaly` and `Comments`.
    pub fn headers(&self) -> Vec<String> {
        let mut headers = self.input_headers.clone();
        headers.push(COL_PREDICTED_ANOMALY.to_string());
        headers.push(COL_COMMENTS.to_string());
        headers
    }

    pub fn anomaly_count(&self) -> usize {
        self.rows.iter().filter(|r| r.predicted_anomaly).count()
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, IngestError> {
        ingest::write_csv(
            &self.headers(),
            self.rows.iter().map(|row| {
                row.cells
                    .iter()
                    .map(String::as_str)
                    .chain([row.predicted_label(), row.comment.as_str()])
            }),
        )
    }

    /// One JSON object per row, keyed by column name.
    pub fn to_json_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut object: Map<String, Value> = self
                    .input_headers
                    .iter()
                    .zip(&row.cells)
                    .map(|(h, c)| (h.clone(), Value::String(c.clone())))
                    .collect();
                object.insert(
                    COL_PREDICTED_ANOMALY.to_string(),
                    Value::String(row.predicted_label().to_string()),
                );
                object.insert(
                    COL_COMMENTS.to_string(),
                    Value::String(row.comment.as_str().to_string()),
                );
                Value::Object(object)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScoredBatch {
        ScoredBatch {
            input_headers: vec!["Account".to_string(), "Match Status".to_string()],
            rows: vec![
                ScoredRow {
                    cells: vec!["A1".to_string(), "Break".to_string()],
                    predicted_anomaly: true,
                    comment: Comment::HugeSpike,
                },
                ScoredRow {
                    cells: vec!["A2".to_string(), "Match".to_string()],
                    predicted_anomaly: false,
                    comment: Comment::None,
                },
            ],
        }
    }

    #[test]
    fn test_csv_appends_result_columns() {
        let csv = String::from_utf8(sample().to_csv().unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Account,Match Status,Predicted Anomaly,Comments");
        assert_eq!(lines[1], "A1,Break,Yes,Huge spike in the outstanding balance.");
        assert_eq!(lines[2], "A2,Match,No,");
    }

    #[test]
    fn test_json_records() {
        let records = sample().to_json_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Account"], "A1");
        assert_eq!(records[0]["Predicted Anomaly"], "Yes");
        assert_eq!(records[1]["Comments"], "");
    }

    #[test]
    fn test_anomaly_count() {
        assert_eq!(sample().anomaly_count(), 1);
    }
}
