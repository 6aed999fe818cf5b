//! Tabular ingest -- CSV uploads into typed reconciliation batches, and
//! scored rows back out to CSV.
//!
//! Every input column is kept verbatim so the scored output can reproduce
//! the upload column-for-column, with the two result columns appended.

pub mod date;

use chrono::NaiveDateTime;
use thiserror::Error;

pub const COL_AS_OF_DATE: &str = "As of Date";
pub const COL_ACCOUNT: &str = "Account";
pub const COL_PRIMARY_ACCOUNT: &str = "Primary Account";
pub const COL_SECONDARY_ACCOUNT: &str = "Secondary Account";
pub const COL_AU: &str = "AU";
pub const COL_BALANCE_DIFFERENCE: &str = "Balance Difference";
pub const COL_MATCH_STATUS: &str = "Match Status";

/// Appended result columns.
pub const COL_PREDICTED_ANOMALY: &str = "Predicted Anomaly";
pub const COL_COMMENTS: &str = "Comments";

/// Columns every upload must carry.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    COL_AS_OF_DATE,
    COL_ACCOUNT,
    COL_PRIMARY_ACCOUNT,
    COL_SECONDARY_ACCOUNT,
    COL_AU,
    COL_BALANCE_DIFFERENCE,
    COL_MATCH_STATUS,
];

/// Match status value that participates in anomaly logic.
pub const STATUS_BREAK: &str = "Break";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Uploaded CSV file is empty")]
    EmptyInput,

    #[error("missing required column: {0}")]
    MissingRequiredColumn(String),

    #[error("row {row}: cannot parse As of Date value {value:?}")]
    DateParseFailure { row: usize, value: String },

    #[error("row {row}: Balance Difference value {value:?} is not a number")]
    InvalidBalance { row: usize, value: String },

    #[error("malformed CSV: {0}")]
    Malformed(#[from] csv::Error),
}

impl IngestError {
    /// Stable machine-readable kind reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::EmptyInput => "EmptyInput",
            IngestError::MissingRequiredColumn(_) => "MissingRequiredColumn",
            IngestError::DateParseFailure { .. } => "DateParseFailure",
            IngestError::InvalidBalance { .. } => "InvalidBalance",
            IngestError::Malformed(_) => "MalformedInput",
        }
    }
}

/// One typed row of a reconciliation upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationRecord {
    pub account: String,
    pub primary_account: String,
    pub secondary_account: String,
    pub au: String,
    pub as_of: NaiveDateTime,
    pub balance_difference: f64,
    pub match_status: String,
}

impl ReconciliationRecord {
    pub fn is_break(&self) -> bool {
        self.match_status == STATUS_BREAK
    }

    /// The four grouping-key components, in sort order.
    pub fn group_key(&self) -> [&str; 4] {
        [
            &self.account,
            &self.primary_account,
            &self.secondary_account,
            &self.au,
        ]
    }

    fn group_key_mut(&mut self) -> [&mut String; 4] {
        [
            &mut self.account,
            &mut self.primary_account,
            &mut self.secondary_account,
            &mut self.au,
        ]
    }
}

/// Numeric value of a grouping-key cell, if it has one.
///
/// Surrounding whitespace is ignored and `-0` reads as `0`.
pub fn numeric_key(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().map(|v| v + 0.0)
}

/// Give every value of an all-numeric key column one spelling.
///
/// `"1"`, `"1.0"`, `" 01"` all become `"1"`, so one account is one group
/// no matter how the export wrote it. Columns with any non-numeric value
/// are left as they are.
fn canonicalize_numeric_keys(records: &mut [ReconciliationRecord]) {
    let mut numeric = [true; 4];
    for record in records.iter() {
        for (flag, value) in numeric.iter_mut().zip(record.group_key()) {
            *flag = *flag && numeric_key(value).is_some();
        }
    }
    for record in records.iter_mut() {
        for (flag, value) in numeric.iter().zip(record.group_key_mut()) {
            if let Some(v) = numeric_key(value.as_str()).filter(|_| *flag) {
                *value = v.to_string();
            }
        }
    }
}

/// A parsed upload.
///
/// `cells[i]` holds the verbatim text of row `i`; `records[i]` is its typed
/// view.
#[derive(Debug, Clone)]
pub struct Batch {
    pub headers: Vec<String>,
    pub cells: Vec<Vec<String>>,
    pub records: Vec<ReconciliationRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Column positions of the required fields within the header row.
struct ColumnIndex {
    as_of: usize,
    account: usize,
    primary: usize,
    secondary: usize,
    au: usize,
    balance: usize,
    status: usize,
}

impl ColumnIndex {
    fn resolve(headers: &[String]) -> Result<Self, IngestError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| IngestError::MissingRequiredColumn(name.to_string()))
        };

        Ok(Self {
            as_of: find(COL_AS_OF_DATE)?,
            account: find(COL_ACCOUNT)?,
            primary: find(COL_PRIMARY_ACCOUNT)?,
            secondary: find(COL_SECONDARY_ACCOUNT)?,
            au: find(COL_AU)?,
            balance: find(COL_BALANCE_DIFFERENCE)?,
            status: find(COL_MATCH_STATUS)?,
        })
    }
}

/// Parse a CSV upload into a [`Batch`].
///
/// Any failure invalidates the whole upload; there is no per-row recovery.
/// Blank `Balance Difference` cells are read as zero. Typed records carry
/// canonical grouping keys while `cells` keep the original text.
pub fn parse_csv(data: &[u8]) -> Result<Batch, IngestError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(IngestError::EmptyInput);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let columns = ColumnIndex::resolve(&headers)?;

    let mut all_cells = Vec::new();
    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let row = i + 1;
        let cells: Vec<String> = record.iter().map(str::to_string).collect();
        let cell = |idx: usize| cells.get(idx).map(String::as_str).unwrap_or("");

        let raw_date = cell(columns.as_of);
        let as_of = date::parse_as_of(raw_date).ok_or_else(|| IngestError::DateParseFailure {
            row,
            value: raw_date.to_string(),
        })?;

        let raw_balance = cell(columns.balance).trim();
        let balance_difference = if raw_balance.is_empty() {
            0.0
        } else {
            raw_balance
                .parse::<f64>()
                .map_err(|_| IngestError::InvalidBalance {
                    row,
                    value: raw_balance.to_string(),
                })?
        };

        let record = ReconciliationRecord {
            account: cell(columns.account).to_string(),
            primary_account: cell(columns.primary).to_string(),
            secondary_account: cell(columns.secondary).to_string(),
            au: cell(columns.au).to_string(),
            as_of,
            balance_difference,
            match_status: cell(columns.status).to_string(),
        };

        all_cells.push(cells);
        records.push(record);
    }

    if records.is_empty() {
        return Err(IngestError::EmptyInput);
    }
    canonicalize_numeric_keys(&mut records);

    tracing::debug!(rows = records.len(), columns = headers.len(), "parsed reconciliation upload");
    Ok(Batch {
        headers,
        cells: all_cells,
        records,
    })
}

/// Render a table as CSV bytes.
pub fn write_csv<'a, I, R>(headers: &[String], rows: I) -> Result<Vec<u8>, IngestError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = &'a str>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.into_inner().map_err(|e| {
        let io = std::io::Error::new(e.error().kind(), e.error().to_string());
        IngestError::Malformed(csv::Error::from(io))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "As of Date,Account,Primary Account,Secondary Account,AU,Balance Difference,Match Status";

    #[test]
    fn test_parse_minimal_upload() {
        let csv = format!("{HEADER}\n2024-01-01,1001,P1,S1,AU9,12.5,Break\n2024-01-02,1001,P1,S1,AU9,,Match\n");
        let batch = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.headers.len(), 7);
        let first = &batch.records[0];
        assert_eq!(first.account, "1001");
        assert_eq!(first.balance_difference, 12.5);
        assert!(first.is_break());
        // Blank balance is read as zero.
        assert_eq!(batch.records[1].balance_difference, 0.0);
        assert!(!batch.records[1].is_break());
    }

    #[test]
    fn test_extra_columns_are_kept() {
        let csv = "Note,As of Date,Account,Primary Account,Secondary Account,AU,Balance Difference,Match Status\n\
                   hello,2024-01-01,A,P,S,U,1,Match\n";
        let batch = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(batch.headers[0], "Note");
        assert_eq!(batch.cells[0][0], "hello");
        assert_eq!(batch.records[0].account, "A");
    }

    #[test]
    fn test_blank_upload_is_empty_input() {
        assert!(matches!(parse_csv(b"   \n\t"), Err(IngestError::EmptyInput)));
        assert!(matches!(parse_csv(HEADER.as_bytes()), Err(IngestError::EmptyInput)));
    }

    #[test]
    fn test_missing_column() {
        let csv = "As of Date,Account,Primary Account,Secondary Account,AU,Match Status\n2024-01-01,A,P,S,U,Break\n";
        match parse_csv(csv.as_bytes()) {
            Err(IngestError::MissingRequiredColumn(col)) => assert_eq!(col, "Balance Difference"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_bad_date_fails_whole_batch() {
        let csv = format!("{HEADER}\n2024-01-01,A,P,S,U,1,Match\nnot-a-date,A,P,S,U,2,Match\n");
        let err = parse_csv(csv.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "DateParseFailure");
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_bad_balance() {
        let csv = format!("{HEADER}\n2024-01-01,A,P,S,U,12abc,Match\n");
        let err = parse_csv(csv.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "InvalidBalance");
    }

    #[test]
    fn test_ragged_row_is_malformed() {
        let csv = format!("{HEADER}\n2024-01-01,A,P\n");
        let err = parse_csv(csv.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "MalformedInput");
    }

    #[test]
    fn test_numeric_key_spellings_are_canonical() {
        let csv = format!(
            "{HEADER}\n\
             2024-01-01,1,P1,007,AU1,1,Match\n\
             2024-01-02,1.0,P1,7,AU1,2,Match\n\
             2024-01-03, 1,P1,7.00,AU1,3,Match\n\
             2024-01-04,01,P1,-0,AU1,4,Match\n"
        );
        let batch = parse_csv(csv.as_bytes()).unwrap();

        let accounts: Vec<&str> = batch.records.iter().map(|r| r.account.as_str()).collect();
        assert_eq!(accounts, vec!["1", "1", "1", "1"]);
        let secondary: Vec<&str> = batch
            .records
            .iter()
            .map(|r| r.secondary_account.as_str())
            .collect();
        assert_eq!(secondary, vec!["7", "7", "7", "0"]);
        // Text columns and the verbatim cells are untouched.
        assert_eq!(batch.records[0].primary_account, "P1");
        assert_eq!(batch.cells[1][1], "1.0");
        assert_eq!(batch.cells[2][1], " 1");
    }

    #[test]
    fn test_mixed_key_column_stays_text() {
        let csv = format!("{HEADER}\n2024-01-01,01,P,S,U,1,Match\n2024-01-02,A1,P,S,U,1,Match\n");
        let batch = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(batch.records[0].account, "01");
        assert_eq!(batch.records[1].account, "A1");
    }

    #[test]
    fn test_write_csv_quotes_fields() {
        let headers = vec!["A".to_string(), "B".to_string()];
        let out = write_csv(&headers, vec![vec!["x", "has, comma"]]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "A,B\nx,\"has, comma\"\n");
    }
}
