//! Canonical tabular result type.
//!
//! Every remote response and every local CSV is turned into a `Table`, a
//! polars `DataFrame` whose columns are all `String`. Cells stay as text
//! from end to end so identifiers and measurement values are written back
//! exactly as the service sent them; a missing cell is a null.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Cursor;
use std::path::Path;

use polars::io::{SerReader, SerWriter};
use polars::prelude::*;

use crate::model::{NwisError, SITE_ID_ALIASES, SITE_NO};

pub type Cell = Option<String>;

/// Temporary column holding the left row order during a join.
const ROW_ORDER: &str = "__row_order";

#[derive(Debug, Clone, Default)]
pub struct Table {
    frame: DataFrame,
}

impl Table {
    /// Builds a table from row-major cells, padding short rows with missing
    /// cells and dropping cells past the last column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, NwisError> {
        let width = columns.len();
        let mut by_column: Vec<Vec<Cell>> = vec![Vec::with_capacity(rows.len()); width];
        for mut row in rows {
            row.resize(width, None);
            for (cells, cell) in by_column.iter_mut().zip(row) {
                cells.push(cell);
            }
        }

        let series: Vec<Column> = columns
            .iter()
            .zip(by_column)
            .map(|(name, cells)| Series::new(name.as_str().into(), cells).into())
            .collect();
        Ok(Table { frame: DataFrame::new(series)? })
    }

    /// Builds a table from raw text fields; empty fields become missing.
    pub fn from_text_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, NwisError> {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| if v.is_empty() { None } else { Some(v) }).collect())
            .collect();
        Table::new(columns, rows)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn columns(&self) -> Vec<String> {
        self.frame.get_column_names().into_iter().map(|c| c.to_string()).collect()
    }

    /// Row-major copy of every cell.
    pub fn rows(&self) -> Vec<Vec<Cell>> {
        let columns: Vec<Vec<Cell>> = self.frame.get_columns().iter().map(text_cells).collect();
        (0..self.len())
            .map(|i| columns.iter().map(|cells| cells[i].clone()).collect())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.frame.get_column_names().iter().position(|c| c.as_str() == name)
    }

    /// Returns the first alias present in this table.
    pub fn find_column<'a>(&self, table: &str, logical: &str, aliases: &[&'a str]) -> Result<&'a str, NwisError> {
        aliases
            .iter()
            .find(|alias| self.has_column(alias))
            .copied()
            .ok_or_else(|| NwisError::MissingColumn {
                table: table.to_string(),
                logical: logical.to_string(),
                tried: aliases.iter().map(|a| a.to_string()).collect(),
            })
    }

    /// Cells of one column, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let values = self.frame.column(name).ok()?.str().ok()?;
        Some(values.into_iter().collect())
    }

    /// Renames `from` to `to`; a missing `from` is left alone.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), NwisError> {
        if self.has_column(from) {
            self.frame.rename(from, to.into())?;
        }
        Ok(())
    }

    /// Makes the site identifier the named column `site_no`.
    ///
    /// The first identifier alias found is renamed. Failing that, a leading
    /// column with an empty header (a row index written out by a dataframe
    /// export) is promoted to `site_no`.
    pub fn normalize_site_column(mut self, table: &str) -> Result<Self, NwisError> {
        if let Some(alias) = SITE_ID_ALIASES.iter().find(|a| self.has_column(a)) {
            self.rename_column(alias, SITE_NO)?;
            return Ok(self);
        }
        if let Some(first) = self.columns().into_iter().next().filter(|c| c.trim().is_empty()) {
            self.rename_column(&first, SITE_NO)?;
            return Ok(self);
        }
        Err(NwisError::MissingColumn {
            table: table.to_string(),
            logical: "site identifier".to_string(),
            tried: SITE_ID_ALIASES.iter().map(|a| a.to_string()).collect(),
        })
    }

    /// Appends a column with every cell missing.
    pub fn push_missing_column(&mut self, name: &str) -> Result<(), NwisError> {
        let height = self.frame.height();
        self.frame.with_column(Series::full_null(name.into(), height, &DataType::String))?;
        Ok(())
    }

    /// Projects `(source, target)` column pairs into a new table. Sources
    /// that are absent produce an all-missing column under the target name.
    pub fn project(&self, pairs: &[(&str, &str)]) -> Result<Table, NwisError> {
        let height = self.frame.height();
        let columns: Vec<Column> = pairs
            .iter()
            .map(|&(src, dst)| match self.frame.column(src) {
                Ok(column) => column.as_materialized_series().clone().with_name(dst.into()).into(),
                Err(_) => Series::full_null(dst.into(), height, &DataType::String).into(),
            })
            .collect();
        Ok(Table { frame: DataFrame::new(columns)? })
    }

    /// Stacks tables vertically. Columns are the union of all inputs in
    /// first-seen order; cells a table does not have are missing.
    pub fn concat(tables: Vec<Table>) -> Result<Table, NwisError> {
        let frames: Vec<DataFrame> = tables.into_iter().map(|t| t.frame).filter(|f| f.width() > 0).collect();

        let mut names: Vec<String> = Vec::new();
        for frame in &frames {
            for name in frame.get_column_names() {
                if !names.iter().any(|n| n == name.as_str()) {
                    names.push(name.to_string());
                }
            }
        }

        let mut stacked: Option<DataFrame> = None;
        for frame in frames {
            let aligned = align_columns(frame, &names)?;
            stacked = Some(match stacked.take() {
                Some(mut acc) => {
                    acc.vstack_mut(&aligned)?;
                    acc
                }
                None => aligned,
            });
        }

        Ok(Table { frame: stacked.unwrap_or_default() })
    }

    /// Left join on `key`. Every row of `self` appears exactly once in the
    /// result, in its original order; if `right` repeats a key, its first
    /// row is used. Right-hand columns whose name already exists on the left
    /// get a `_y` suffix.
    pub fn left_join(&self, right: &Table, key: &str) -> Result<Table, NwisError> {
        if !self.has_column(key) {
            return Err(missing_key("left", key));
        }
        let keys = right.frame.column(key).map_err(|_| missing_key("right", key))?.str()?;

        let mut seen = HashSet::new();
        let first_rows: Vec<IdxSize> = keys
            .into_iter()
            .enumerate()
            .filter_map(|(i, k)| k.filter(|k| seen.insert(*k)).map(|_| i as IdxSize))
            .collect();
        let mut lookup = right.frame.take(&IdxCa::new("first_rows".into(), first_rows))?;

        for name in right.columns() {
            if name != key && self.has_column(&name) {
                lookup.rename(&name, format!("{}_y", name).into())?;
            }
        }

        let joined = self
            .frame
            .with_row_index(ROW_ORDER.into(), None)?
            .left_join(&lookup, [key], [key])?
            .sort([ROW_ORDER], SortMultipleOptions::default())?
            .drop(ROW_ORDER)?;

        Ok(Table { frame: joined })
    }

    /// Keeps rows whose `column` value is one of `allowed`.
    pub fn filter_in(&self, column: &str, allowed: &[String]) -> Result<Table, NwisError> {
        let values = self.frame.column(column).map_err(|_| missing_key("filtered", column))?.str()?;
        let mask: BooleanChunked = values
            .into_iter()
            .map(|v| v.is_some_and(|v| allowed.iter().any(|a| a == v)))
            .collect();
        Ok(Table { frame: self.frame.filter(&mask)? })
    }

    // -----------------------------------------------------------------------
    // CSV
    // -----------------------------------------------------------------------

    /// Parses comma-separated text with a header row. Every column is read
    /// as text so identifiers keep their leading zeros.
    pub fn parse_csv(text: &str) -> Result<Table, NwisError> {
        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(text.as_bytes()))
            .finish()?;
        Ok(Table { frame })
    }

    pub fn read_csv(path: &Path) -> Result<Table, NwisError> {
        let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        Table::parse_csv(text.strip_prefix('\u{feff}').unwrap_or(&text))
    }

    /// Renders the table as CSV. Missing cells are written as empty fields.
    pub fn to_csv_string(&self) -> Result<String, NwisError> {
        let mut buffer = Vec::new();
        CsvWriter::new(&mut buffer).finish(&mut self.frame.clone())?;
        String::from_utf8(buffer).map_err(|e| NwisError::Table(format!("CSV output is not valid UTF-8: {}", e)))
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), NwisError> {
        let file = File::create(path).map_err(|e| io_error(path, e))?;
        CsvWriter::new(file).finish(&mut self.frame.clone())?;
        Ok(())
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.columns() == other.columns() && self.rows() == other.rows()
    }
}

/// Adds the `names` a frame lacks as all-missing columns, in `names` order.
fn align_columns(mut frame: DataFrame, names: &[String]) -> Result<DataFrame, NwisError> {
    let height = frame.height();
    for name in names {
        if !frame.get_column_names().iter().any(|c| c.as_str() == name) {
            frame.with_column(Series::full_null(name.as_str().into(), height, &DataType::String))?;
        }
    }
    Ok(frame.select(names.iter().map(String::as_str))?)
}

fn text_cells(column: &Column) -> Vec<Cell> {
    match column.str() {
        Ok(values) => values.into_iter().map(|v| v.map(String::from)).collect(),
        Err(_) => vec![None; column.len()],
    }
}

fn missing_key(side: &str, key: &str) -> NwisError {
    NwisError::MissingColumn {
        table: side.to_string(),
        logical: key.to_string(),
        tried: vec![key.to_string()],
    }
}

pub(crate) fn io_error(path: &Path, err: std::io::Error) -> NwisError {
    NwisError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
