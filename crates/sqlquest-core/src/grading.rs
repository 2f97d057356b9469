//! Result-set comparison used to decide whether a submitted query is correct.
//!
//! Two result sets match when they expose the same column set, have the same number
//! of rows, and hold the same multiset of rows once every row is projected onto a
//! canonical column order. Row order and column order never matter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// One result row: column name to scalar value.
pub type Row = Map<String, Value>;

const FIELD_SEPARATOR: char = '\u{1f}';
const MISSING_CELL: &str = "<missing>";
// Largest integer an f64 represents exactly.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultSide {
    Actual,
    Expected,
}

impl ResultSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSide::Actual => "actual",
            ResultSide::Expected => "expected",
        }
    }
}

impl fmt::Display for ResultSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GradeError {
    #[error("{side} result must be an array of rows")]
    NotAnArray { side: ResultSide },
    #[error("{side} row {index} is not an object")]
    NotARow { side: ResultSide, index: usize },
    #[error("{side} row {index} column {column:?} holds a non-scalar value")]
    NonScalarValue {
        side: ResultSide,
        index: usize,
        column: String,
    },
    #[error("{side} row {index} has columns [{found}], first row has [{expected}]")]
    InconsistentColumns {
        side: ResultSide,
        index: usize,
        expected: String,
        found: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradeReport {
    pub matches: bool,
    pub differences: Vec<String>,
}

/// Grades raw JSON result sets, rejecting anything that is not an array of flat objects.
pub fn compare_values(actual: &Value, expected: &Value) -> Result<GradeReport, GradeError> {
    let actual = rows_from_value(actual, ResultSide::Actual)?;
    let expected = rows_from_value(expected, ResultSide::Expected)?;
    compare(&actual, &expected)
}

pub fn compare(actual: &[Row], expected: &[Row]) -> Result<GradeReport, GradeError> {
    validate_rows(actual, ResultSide::Actual)?;
    validate_rows(expected, ResultSide::Expected)?;

    let mut differences = Vec::new();

    let actual_columns = column_set(actual);
    let expected_columns = column_set(expected);
    if actual_columns != expected_columns {
        differences.push(format!(
            "column mismatch: actual [{}] vs expected [{}]",
            join_columns(&actual_columns),
            join_columns(&expected_columns)
        ));
    }

    if actual.len() != expected.len() {
        differences.push(format!(
            "row count mismatch: actual {} vs expected {}",
            actual.len(),
            expected.len()
        ));
    }

    let canonical = if expected_columns.is_empty() {
        &actual_columns
    } else {
        &expected_columns
    };
    if encode_sorted(actual, canonical) != encode_sorted(expected, canonical) {
        differences.push("row set differs".to_string());
    }

    Ok(GradeReport {
        matches: differences.is_empty(),
        differences,
    })
}

fn rows_from_value(value: &Value, side: ResultSide) -> Result<Vec<Row>, GradeError> {
    let items = value.as_array().ok_or(GradeError::NotAnArray { side })?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_object()
                .cloned()
                .ok_or(GradeError::NotARow { side, index })
        })
        .collect()
}

fn validate_rows(rows: &[Row], side: ResultSide) -> Result<(), GradeError> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let expected = first.keys().map(String::as_str).collect::<BTreeSet<_>>();

    for (index, row) in rows.iter().enumerate() {
        if let Some((column, _)) = row.iter().find(|(_, value)| !is_scalar(value)) {
            return Err(GradeError::NonScalarValue {
                side,
                index,
                column: column.clone(),
            });
        }
        let found = row.keys().map(String::as_str).collect::<BTreeSet<_>>();
        if found != expected {
            return Err(GradeError::InconsistentColumns {
                side,
                index,
                expected: join_columns(&expected),
                found: join_columns(&found),
            });
        }
    }
    Ok(())
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn column_set(rows: &[Row]) -> BTreeSet<&str> {
    rows.first()
        .map(|row| row.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

fn join_columns(columns: &BTreeSet<&str>) -> String {
    columns.iter().copied().collect::<Vec<_>>().join(", ")
}

fn encode_sorted(rows: &[Row], columns: &BTreeSet<&str>) -> Vec<String> {
    let mut encoded = rows
        .iter()
        .map(|row| encode_row(row, columns))
        .collect::<Vec<_>>();
    encoded.sort();
    encoded
}

fn encode_row(row: &Row, columns: &BTreeSet<&str>) -> String {
    columns
        .iter()
        .map(|column| {
            row.get(*column)
                .map(encode_scalar)
                .unwrap_or_else(|| MISSING_CELL.to_string())
        })
        .collect::<Vec<_>>()
        .join(&FIELD_SEPARATOR.to_string())
}

fn encode_scalar(value: &Value) -> String {
    if let Value::Number(number) = value {
        if !number.is_i64() && !number.is_u64() {
            if let Some(float) = number.as_f64() {
                if float.fract() == 0.0 && float.abs() < MAX_EXACT_FLOAT_INT {
                    return format!("{}", float as i64);
                }
            }
        }
    }
    value.to_string()
}
