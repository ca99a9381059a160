//! USGS RDB (tab-delimited) response parsing
//!
//! Every NWIS water service used here answers in RDB:
//!
//! ```text
//! # comment lines
//! agency_cd	site_no	station_nm	dec_lat_va	...
//! 5s	15s	50s	16s	...
//! USGS	382012120213501	...
//! ```
//!
//! The row after the header describes column widths and types
//! (`5s`, `15s`, `10n`, `12d`) and carries no data.

use crate::model::NwisError;
use crate::table::Table;

/// Raw RDB content: header names plus the data rows split on tabs.
/// Rows are kept ragged; short rows are the caller's concern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RdbDocument {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RdbDocument {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Field `idx` of `row`, if the row is long enough.
    pub fn field<'a>(row: &'a [String], idx: usize) -> Option<&'a str> {
        row.get(idx).map(|s| s.as_str())
    }

    pub fn into_table(self) -> Result<Table, NwisError> {
        Table::from_text_rows(self.headers, self.rows)
    }
}

/// Parses an RDB body. A body with no header line yields an empty document.
pub fn parse_rdb(text: &str) -> RdbDocument {
    let mut doc = RdbDocument::default();
    let mut header_found = false;
    let mut format_row_checked = false;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<String> = line.split('\t').map(|f| f.trim().to_string()).collect();

        if !header_found {
            doc.headers = fields;
            header_found = true;
            continue;
        }

        if !format_row_checked {
            format_row_checked = true;
            if is_format_row(line) {
                continue;
            }
        }

        doc.rows.push(fields);
    }

    doc
}

/// Recognizes the column-format row: either every field is an RDB format
/// code, or the line repeats the `agency_cd` header sentinel.
fn is_format_row(line: &str) -> bool {
    if line.starts_with("agency_cd") {
        return true;
    }
    line.split('\t').all(|f| is_format_code(f.trim()))
}

/// `5s`, `15s`, `10n`, `12d` and friends: digits followed by a type letter.
fn is_format_code(field: &str) -> bool {
    let digits = field.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let suffix = &field[digits.len()..];
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) && suffix.len() == 1
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
