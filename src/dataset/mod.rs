//! Dataset snapshots
//!
//! A `DatasetSnapshot` is an immutable, fingerprinted table of labeled rows.
//! Snapshots are created by loading a CSV file (or built in memory) and are
//! superseded, never mutated, by merging in new data.
//!
//! # Example
//!
//! ```
//! use reentrenar::dataset::{DatasetSnapshot, Value};
//!
//! let csv = "years_experience,role,salary\n3,engineer,70000\n5,manager,90000\n";
//! let snapshot = DatasetSnapshot::parse_csv(csv).unwrap();
//!
//! assert_eq!(snapshot.n_rows(), 2);
//! assert_eq!(snapshot.schema().column_names(), vec!["years_experience", "role", "salary"]);
//! assert_eq!(snapshot.rows()[0][1], Value::Text("engineer".to_string()));
//! ```

pub mod fingerprint;
pub mod merge;

pub use fingerprint::Fingerprint;
pub use merge::merge;

use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Parses as f64 in every non-missing cell
    Numeric,
    /// Free-form text, treated as categorical
    Categorical,
}

/// A single column: name plus inferred type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

/// Ordered column list for a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of a column by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Canonical serialization of the schema, folded into the fingerprint
    pub(crate) fn canonical_token(&self) -> String {
        let mut out = String::new();
        for col in &self.columns {
            let ty = match col.ty {
                ColumnType::Numeric => "num",
                ColumnType::Categorical => "cat",
            };
            let _ = write!(out, "{}:{};", col.name, ty);
        }
        out
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical token for row keys and fingerprints. Tagged so that the
    /// number 1 and the text "1" never collide.
    pub(crate) fn canonical_token(&self) -> String {
        match self {
            Value::Number(n) => format!("n:{n}"),
            Value::Text(s) => format!("t:{s}"),
            Value::Missing => "m".to_string(),
        }
    }

    fn to_csv_field(&self) -> String {
        match self {
            Value::Number(n) => format!("{n}"),
            Value::Text(s) => {
                if s.contains(',') || s.contains('"') || s.contains('\n') {
                    format!("\"{}\"", s.replace('"', "\"\""))
                } else {
                    s.clone()
                }
            }
            Value::Missing => String::new(),
        }
    }
}

/// A single row, cells aligned with the schema's column order
pub type Row = Vec<Value>;

/// Canonical key identifying a row by its full content.
///
/// Two rows with identical cell values (in schema column order) share a key;
/// any changed cell produces a different key. Used for deduplication during
/// merge and for order-independent fingerprinting.
pub fn row_key(row: &Row) -> String {
    let mut key = String::new();
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            key.push('\x1f');
        }
        key.push_str(&cell.canonical_token());
    }
    key
}

/// Immutable, fingerprinted table of labeled rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    schema: Schema,
    rows: Vec<Row>,
    fingerprint: Fingerprint,
}

impl DatasetSnapshot {
    /// Build a snapshot from a schema and rows, computing its fingerprint.
    ///
    /// Fails with `SchemaMismatch` if any row's cell count differs from the
    /// schema's column count.
    pub fn new(schema: Schema, rows: Vec<Row>) -> Result<Self> {
        for row in &rows {
            if row.len() != schema.len() {
                return Err(Error::SchemaMismatch {
                    expected: schema.column_names().iter().map(|s| s.to_string()).collect(),
                    got: vec![format!("row with {} cells", row.len())],
                });
            }
        }
        let fingerprint = Fingerprint::compute(&schema, &rows);
        Ok(Self {
            schema,
            rows,
            fingerprint,
        })
    }

    /// Load a snapshot from a CSV file
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse_csv(&content)
    }

    /// Parse a snapshot from CSV text. The first line is the header; column
    /// types are inferred (a column is numeric when every non-empty cell
    /// parses as f64). Empty cells become `Value::Missing`.
    pub fn parse_csv(content: &str) -> Result<Self> {
        let mut lines = content.lines();
        let header = lines
            .next()
            .ok_or_else(|| Error::DataQuality("empty CSV input".to_string()))?;
        let names = split_csv_line(header);
        if names.iter().any(|n| n.is_empty()) {
            return Err(Error::DataQuality("CSV header has an empty column name".to_string()));
        }

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for (lineno, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_csv_line(line);
            if fields.len() != names.len() {
                return Err(Error::DataQuality(format!(
                    "CSV row {} has {} fields, expected {}",
                    lineno + 2,
                    fields.len(),
                    names.len()
                )));
            }
            raw_rows.push(fields);
        }

        // Infer per-column types from the data
        let mut columns = Vec::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            let mut numeric = true;
            let mut saw_value = false;
            for row in &raw_rows {
                let cell = row[idx].trim();
                if cell.is_empty() {
                    continue;
                }
                saw_value = true;
                if cell.parse::<f64>().is_err() {
                    numeric = false;
                    break;
                }
            }
            let ty = if numeric && saw_value {
                ColumnType::Numeric
            } else {
                ColumnType::Categorical
            };
            columns.push(Column {
                name: name.clone(),
                ty,
            });
        }
        let schema = Schema::new(columns);

        let rows = raw_rows
            .into_iter()
            .map(|raw| {
                raw.into_iter()
                    .zip(schema.columns())
                    .map(|(cell, col)| {
                        let cell = cell.trim();
                        if cell.is_empty() {
                            Value::Missing
                        } else {
                            match col.ty {
                                ColumnType::Numeric => Value::Number(
                                    cell.parse::<f64>().unwrap_or(f64::NAN),
                                ),
                                ColumnType::Categorical => Value::Text(cell.to_string()),
                            }
                        }
                    })
                    .collect()
            })
            .collect();

        Self::new(schema, rows)
    }

    /// Serialize the snapshot back to CSV text
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let names: Vec<String> = self
            .schema
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let _ = writeln!(out, "{}", names.join(","));
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(Value::to_csv_field).collect();
            let _ = writeln!(out, "{}", fields.join(","));
        }
        out
    }

    /// Write the snapshot to a CSV file
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_csv())?;
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// All values in one column, by name
    pub fn column_values(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }
}

/// Split a CSV line into fields, honoring double-quoted fields with
/// embedded commas and doubled quotes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
