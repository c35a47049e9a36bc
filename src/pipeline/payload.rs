//! Table payload decoding.
//!
//! Models answer Table-mode requests in one of two shapes:
//!
//! ```text
//! (a) {"columns": ["Name", "Amount"], "rows": [["A", "10"], ["B", "20"]]}
//! (b) [{"Name": "A", "Amount": "10"}, {"Name": "B"}]
//! ```
//!
//! [`decode_table`] turns the raw response into a [`TablePayload`] or a named
//! [`PayloadError`]. Anything else is rejected rather than coerced. Cells are
//! flattened to strings here so the aggregator never sees JSON values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::pipeline::postprocess::strip_code_fences;

/// One record of shape (b): column name → cell text.
pub type Record = BTreeMap<String, String>;

/// A decoded Table-mode response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TablePayload {
    /// Shape (a): explicit column list plus positional rows.
    Columnar {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// Shape (b): list of key/value records.
    Records(Vec<Record>),
}

impl TablePayload {
    /// Columns this payload would establish as the schema.
    ///
    /// For records this is the union of all keys, sorted lexicographically.
    pub fn columns(&self) -> Vec<String> {
        match self {
            TablePayload::Columnar { columns, .. } => columns.clone(),
            TablePayload::Records(records) => records
                .iter()
                .flat_map(|r| r.keys().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }

    /// Project the payload's rows onto `schema`.
    ///
    /// Columnar rows are matched by position: short rows are padded with
    /// empty cells, long rows are truncated. Records are matched by column
    /// name; missing keys become empty cells and extra keys are dropped.
    pub fn project(&self, schema: &[String]) -> Vec<Vec<String>> {
        match self {
            TablePayload::Columnar { rows, .. } => rows
                .iter()
                .map(|row| {
                    let mut projected: Vec<String> =
                        row.iter().take(schema.len()).cloned().collect();
                    projected.resize(schema.len(), String::new());
                    projected
                })
                .collect(),
            TablePayload::Records(records) => records
                .iter()
                .map(|record| {
                    schema
                        .iter()
                        .map(|col| record.get(col).cloned().unwrap_or_default())
                        .collect()
                })
                .collect(),
        }
    }
}

/// Why a Table-mode response could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PayloadError {
    /// Not JSON at all.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// JSON, but neither a `{columns, rows}` object nor a list of records.
    #[error("unexpected JSON shape: {0}")]
    UnexpectedShape(String),

    /// A `{columns, rows}` object with an empty column list.
    #[error("'columns' is empty")]
    EmptyColumns,

    /// A record list with no records, or only empty records.
    #[error("record list is empty")]
    EmptyRecords,

    /// A `rows` entry that is not an array.
    #[error("row {index} is not an array")]
    RowNotArray { index: usize },

    /// A record-list entry that is not an object.
    #[error("record {index} is not an object")]
    RecordNotObject { index: usize },
}

/// Decode a raw Table-mode response.
///
/// An outer Markdown code fence (```` ```json ````) is stripped first;
/// models add one often enough that rejecting it would discard good pages.
pub fn decode_table(raw: &str) -> Result<TablePayload, PayloadError> {
    let body = strip_code_fences(raw);
    let value: Value =
        serde_json::from_str(body.trim()).map_err(|e| PayloadError::InvalidJson(e.to_string()))?;

    match value {
        Value::Object(obj) => decode_columnar(obj),
        Value::Array(items) => decode_records(items),
        other => Err(PayloadError::UnexpectedShape(format!(
            "expected an object or an array, got {}",
            json_type(&other)
        ))),
    }
}

fn decode_columnar(mut obj: Map<String, Value>) -> Result<TablePayload, PayloadError> {
    let columns = match obj.remove("columns") {
        Some(Value::Array(cols)) => cols.into_iter().map(cell_text).collect::<Vec<_>>(),
        Some(other) => {
            return Err(PayloadError::UnexpectedShape(format!(
                "'columns' must be an array, got {}",
                json_type(&other)
            )))
        }
        None => {
            return Err(PayloadError::UnexpectedShape(
                "object without a 'columns' array".into(),
            ))
        }
    };
    if columns.is_empty() {
        return Err(PayloadError::EmptyColumns);
    }

    let rows = match obj.remove("rows") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(rows)) => rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| match row {
                Value::Array(cells) => Ok(cells.into_iter().map(cell_text).collect()),
                _ => Err(PayloadError::RowNotArray { index }),
            })
            .collect::<Result<Vec<Vec<String>>, _>>()?,
        Some(other) => {
            return Err(PayloadError::UnexpectedShape(format!(
                "'rows' must be an array, got {}",
                json_type(&other)
            )))
        }
    };

    Ok(TablePayload::Columnar { columns, rows })
}

fn decode_records(items: Vec<Value>) -> Result<TablePayload, PayloadError> {
    let records = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, cell_text(v)))
                .collect::<Record>()),
            _ => Err(PayloadError::RecordNotObject { index }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if records.iter().all(|r| r.is_empty()) {
        return Err(PayloadError::EmptyRecords);
    }
    Ok(TablePayload::Records(records))
}

/// Flatten a JSON value into cell text.
fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested @ (Value::Array(_) | Value::Object(_)) => nested.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
