//! Merging incoming data into the reference dataset
//!
//! `merge` combines an incoming batch with the existing reference snapshot
//! into a new candidate snapshot. Rows are deduplicated by canonical row key
//! with incoming rows taking precedence on conflict; incoming rows with a
//! missing label are dropped before merging so a bad batch cannot poison the
//! reference data.

use std::collections::HashMap;

use crate::error::{Error, Result};

use super::{row_key, DatasetSnapshot, Row, Value};

/// Merge an incoming batch into the reference snapshot.
///
/// Incoming must contain exactly the reference's columns (same names, same
/// inferred types; order may differ). Incoming cells are reordered to the
/// reference column order before deduplication. Rows whose label cell is
/// missing are dropped from the incoming batch.
///
/// If incoming contributes no net-new row, the candidate has the same content
/// and fingerprint as the reference.
pub fn merge(
    reference: &DatasetSnapshot,
    incoming: &DatasetSnapshot,
    label_column: &str,
) -> Result<DatasetSnapshot> {
    let ref_schema = reference.schema();
    let expected: Vec<String> = ref_schema
        .column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let got: Vec<String> = incoming
        .schema()
        .column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    if incoming.schema().len() != ref_schema.len() {
        return Err(Error::SchemaMismatch { expected, got });
    }

    // Map each reference column to its position in the incoming schema,
    // checking name and type agreement.
    let mut reorder = Vec::with_capacity(ref_schema.len());
    for col in ref_schema.columns() {
        match incoming.schema().index_of(&col.name) {
            Some(idx) if incoming.schema().columns()[idx].ty == col.ty => reorder.push(idx),
            _ => return Err(Error::SchemaMismatch { expected, got }),
        }
    }

    let label_idx = ref_schema
        .index_of(label_column)
        .ok_or_else(|| Error::ColumnNotFound(label_column.to_string()))?;

    let mut rows: Vec<Row> = reference.rows().to_vec();
    let mut index: HashMap<String, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| (row_key(r), i))
        .collect();

    for raw in incoming.rows() {
        let row: Row = reorder.iter().map(|&i| raw[i].clone()).collect();
        if matches!(row[label_idx], Value::Missing) {
            continue;
        }
        let key = row_key(&row);
        match index.get(&key) {
            // Last-write-wins: incoming replaces the reference row in place
            Some(&pos) => rows[pos] = row,
            None => {
                index.insert(key, rows.len());
                rows.push(row);
            }
        }
    }

    DatasetSnapshot::new(ref_schema.clone(), rows)
}
