//! Input table loading and array cell helpers
//!
//! The input is an arbitrary CSV with one identifier column. All other columns
//! are carried through untouched so the merged output reproduces them.

use crate::error::{Error, Result};
use crate::types::SourceId;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Rows of the input CSV plus the parsed identifier column
#[derive(Clone, Debug, PartialEq)]
pub struct InputTable {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
    id_column: String,
    id_index: usize,
    ids: Vec<SourceId>,
}

impl InputTable {
    /// Read a CSV file, keying rows on `id_column`
    pub fn from_path(path: impl AsRef<Path>, id_column: &str) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file, id_column)
    }

    /// Read CSV data from any reader
    pub fn from_reader<R: Read>(reader: R, id_column: &str) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();

        let mut records = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            records.push(record.iter().map(str::to_string).collect());
        }

        Self::from_parts(headers, records, id_column)
    }

    /// Build a table from already split rows
    pub fn from_parts(
        headers: Vec<String>,
        records: Vec<Vec<String>>,
        id_column: &str,
    ) -> Result<Self> {
        let id_index = headers
            .iter()
            .position(|h| h == id_column)
            .ok_or_else(|| Error::MissingColumn {
                column: id_column.to_string(),
            })?;

        let mut ids = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let raw = record.get(id_index).map(String::as_str).unwrap_or_default();
            let id = raw.parse::<SourceId>().map_err(|_| Error::InvalidIdentifier {
                row: i + 1,
                value: raw.to_string(),
            })?;
            ids.push(id);
        }

        Ok(Self {
            headers,
            records,
            id_column: id_column.to_string(),
            id_index,
            ids,
        })
    }

    /// Column names in file order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Raw cell values, one vector per row
    pub fn records(&self) -> &[Vec<String>] {
        &self.records
    }

    /// Join key column name
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Identifier of every row, duplicates included
    pub fn ids(&self) -> &[SourceId] {
        &self.ids
    }

    /// Distinct identifiers in first-seen order
    pub fn distinct_ids(&self) -> Vec<SourceId> {
        let mut seen = HashSet::with_capacity(self.ids.len());
        self.ids.iter().copied().filter(|id| seen.insert(*id)).collect()
    }

    /// Position of a named column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        if name == self.id_column {
            return Some(self.id_index);
        }
        self.headers.iter().position(|h| h == name)
    }

    /// Cell value, empty if the row is short
    pub fn value(&self, row: usize, column: usize) -> &str {
        self.records
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the table has no data rows
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Render a numeric vector as a single CSV cell: `[1.5 2 3.25]`
pub fn format_array_cell(values: &[f64]) -> String {
    let mut cell = String::with_capacity(values.len() * 12 + 2);
    cell.push('[');
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            cell.push(' ');
        }
        cell.push_str(&v.to_string());
    }
    cell.push(']');
    cell
}

/// Parse a bracketed, whitespace separated array cell
///
/// Tolerates line breaks and repeated spaces inside the brackets, which is how
/// wide arrays come back from tools that wrap long cells.
pub fn parse_array_cell(cell: &str) -> Result<Vec<f64>> {
    let inner = cell
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| Error::InvalidArrayCell(format!("missing brackets in '{cell}'")))?;

    inner
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| Error::InvalidArrayCell(format!("'{token}' is not a number")))
        })
        .collect()
}
