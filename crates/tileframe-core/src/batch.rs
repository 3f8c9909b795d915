//! Caller-supplied rows for writing.
//!
//! A [`Batch`] is an ordered list of rows, each carrying an explicit row
//! index and a map from column name to [`Value`]. Batches can be built row by
//! row, from equal-length columns laid out from a starting row, or imported
//! from an Arrow [`RecordBatch`].
//!
//! A cell missing from a row and a cell present as [`Value::Null`] differ in
//! sparse arrays: the former leaves the stored cell untouched, the latter
//! clears it.

use std::collections::{BTreeMap, BTreeSet};

use arrow::{
    array::{Array, AsArray},
    datatypes::{
        DataType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type,
        UInt8Type, UInt16Type, UInt32Type, UInt64Type,
    },
    record_batch::RecordBatch,
};
use snafu::prelude::*;

use crate::value::Value;

/// Errors raised while assembling a batch.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum BatchError {
    /// Columns passed to [`Batch::from_columns`] differ in length.
    #[snafu(display("Column {column} has {found} values, expected {expected}"))]
    ColumnLengthMismatch {
        /// The offending column.
        column: String,
        /// Length of the first column.
        expected: usize,
        /// Length of this column.
        found: usize,
    },

    /// The requested index column is not in the record batch.
    #[snafu(display("Index column {column} not found in record batch"))]
    IndexColumnMissing {
        /// Requested index column.
        column: String,
    },

    /// The index column holds a null or negative value, or has a non-integer type.
    #[snafu(display("Invalid row index in column {column} at position {position}: {details}"))]
    InvalidIndex {
        /// Index column name.
        column: String,
        /// Position within the record batch.
        position: usize,
        /// Problem description.
        details: String,
    },

    /// The record batch has a column type with no [`Value`] counterpart.
    #[snafu(display("Unsupported Arrow type {data_type} for column {column}"))]
    UnsupportedArrowType {
        /// Column name.
        column: String,
        /// Rendering of the Arrow type.
        data_type: String,
    },

    /// Positional row indices would exceed `u64::MAX`.
    #[snafu(display("Row index overflow: start {start} plus {len} rows"))]
    RowIndexOverflow {
        /// Starting row.
        start: u64,
        /// Number of rows.
        len: usize,
    },
}

/// One row of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    index: u64,
    cells: BTreeMap<String, Value>,
}

impl BatchRow {
    /// A row at `index` with the given cells. Later duplicates of a column
    /// name replace earlier ones.
    pub fn new<K, V>(index: u64, cells: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        BatchRow {
            index,
            cells: cells
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Row index.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Cells keyed by column name.
    pub fn cells(&self) -> &BTreeMap<String, Value> {
        &self.cells
    }

    /// The cell for `column`, if given.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.get(column)
    }
}

/// Rows to write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    rows: Vec<BatchRow>,
}

/// Incremental [`Batch`] construction.
#[derive(Debug, Default)]
pub struct BatchBuilder {
    rows: Vec<BatchRow>,
}

impl BatchBuilder {
    /// Append a row.
    pub fn row<K, V>(mut self, index: u64, cells: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.rows.push(BatchRow::new(index, cells));
        self
    }

    /// Finish the batch.
    pub fn build(self) -> Batch {
        Batch { rows: self.rows }
    }
}

fn positional_index(start: u64, offset: usize, len: usize) -> Result<u64, BatchError> {
    u64::try_from(offset)
        .ok()
        .and_then(|o| start.checked_add(o))
        .context(RowIndexOverflowSnafu { start, len })
}

impl Batch {
    /// Start building a batch row by row.
    pub fn builder() -> BatchBuilder {
        BatchBuilder::default()
    }

    /// A batch from prebuilt rows.
    pub fn from_rows(rows: Vec<BatchRow>) -> Self {
        Batch { rows }
    }

    /// Lay out equal-length columns on consecutive rows starting at
    /// `start_row`; value `i` of every column lands on row `start_row + i`.
    pub fn from_columns<K: Into<String>>(
        start_row: u64,
        columns: Vec<(K, Vec<Value>)>,
    ) -> Result<Self, BatchError> {
        let columns: Vec<(String, Vec<Value>)> =
            columns.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let len = columns.first().map_or(0, |(_, v)| v.len());
        for (name, values) in &columns {
            ensure!(
                values.len() == len,
                ColumnLengthMismatchSnafu {
                    column: name.clone(),
                    expected: len,
                    found: values.len(),
                }
            );
        }

        let mut rows: Vec<BatchRow> = (0..len)
            .map(|i| {
                Ok(BatchRow {
                    index: positional_index(start_row, i, len)?,
                    cells: BTreeMap::new(),
                })
            })
            .collect::<Result<_, BatchError>>()?;
        for (name, values) in columns {
            for (row, value) in rows.iter_mut().zip(values) {
                row.cells.insert(name.clone(), value);
            }
        }
        Ok(Batch { rows })
    }

    /// Import an Arrow record batch.
    ///
    /// With `index_column`, row indices come from that integer column (which
    /// is not stored as a cell); otherwise rows are numbered from
    /// `start_row`. Arrow nulls become explicit [`Value::Null`] cells.
    pub fn from_record_batch(
        batch: &RecordBatch,
        index_column: Option<&str>,
        start_row: u64,
    ) -> Result<Self, BatchError> {
        let schema = batch.schema();
        let len = batch.num_rows();

        let indices: Vec<u64> = match index_column {
            Some(name) => {
                let (pos, _) = schema.column_with_name(name).context(IndexColumnMissingSnafu {
                    column: name.to_string(),
                })?;
                index_values(name, batch.column(pos).as_ref())?
            }
            None => (0..len)
                .map(|i| positional_index(start_row, i, len))
                .collect::<Result<_, _>>()?,
        };

        let mut rows: Vec<BatchRow> = indices
            .into_iter()
            .map(|index| BatchRow {
                index,
                cells: BTreeMap::new(),
            })
            .collect();

        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            if Some(field.name().as_str()) == index_column {
                continue;
            }
            let values = arrow_values(field.name(), array.as_ref())?;
            for (row, value) in rows.iter_mut().zip(values) {
                row.cells.insert(field.name().clone(), value);
            }
        }
        Ok(Batch { rows })
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> &[BatchRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every column name used by any row, sorted.
    pub fn column_names(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .flat_map(|r| r.cells.keys().map(String::as_str))
            .collect()
    }
}

fn index_values(column: &str, array: &dyn Array) -> Result<Vec<u64>, BatchError> {
    let invalid = |position: usize, details: String| {
        InvalidIndexSnafu {
            column: column.to_string(),
            position,
            details,
        }
        .build()
    };

    let mut out = Vec::with_capacity(array.len());
    match array.data_type() {
        DataType::UInt64 => {
            let arr = array.as_primitive::<UInt64Type>();
            for i in 0..arr.len() {
                if arr.is_null(i) {
                    return Err(invalid(i, "null".to_string()));
                }
                out.push(arr.value(i));
            }
        }
        DataType::Int64 | DataType::Int32 => {
            for i in 0..array.len() {
                if array.is_null(i) {
                    return Err(invalid(i, "null".to_string()));
                }
                let v = match array.data_type() {
                    DataType::Int32 => i64::from(array.as_primitive::<Int32Type>().value(i)),
                    _ => array.as_primitive::<Int64Type>().value(i),
                };
                let v = u64::try_from(v).map_err(|_| invalid(i, format!("negative value {v}")))?;
                out.push(v);
            }
        }
        other => return Err(invalid(0, format!("unsupported index type {other}"))),
    }
    Ok(out)
}

fn arrow_values(column: &str, array: &dyn Array) -> Result<Vec<Value>, BatchError> {
    fn collect<F>(array: &dyn Array, f: F) -> Vec<Value>
    where
        F: Fn(usize) -> Value,
    {
        (0..array.len())
            .map(|i| if array.is_null(i) { Value::Null } else { f(i) })
            .collect()
    }

    Ok(match array.data_type() {
        DataType::Null => vec![Value::Null; array.len()],
        DataType::Int8 => {
            let a = array.as_primitive::<Int8Type>();
            collect(array, |i| Value::Int64(i64::from(a.value(i))))
        }
        DataType::Int16 => {
            let a = array.as_primitive::<Int16Type>();
            collect(array, |i| Value::Int64(i64::from(a.value(i))))
        }
        DataType::Int32 => {
            let a = array.as_primitive::<Int32Type>();
            collect(array, |i| Value::Int64(i64::from(a.value(i))))
        }
        DataType::Int64 => {
            let a = array.as_primitive::<Int64Type>();
            collect(array, |i| Value::Int64(a.value(i)))
        }
        DataType::UInt8 => {
            let a = array.as_primitive::<UInt8Type>();
            collect(array, |i| Value::Int64(i64::from(a.value(i))))
        }
        DataType::UInt16 => {
            let a = array.as_primitive::<UInt16Type>();
            collect(array, |i| Value::Int64(i64::from(a.value(i))))
        }
        DataType::UInt32 => {
            let a = array.as_primitive::<UInt32Type>();
            collect(array, |i| Value::Int64(i64::from(a.value(i))))
        }
        DataType::Float32 => {
            let a = array.as_primitive::<Float32Type>();
            collect(array, |i| Value::Float64(f64::from(a.value(i))))
        }
        DataType::Float64 => {
            let a = array.as_primitive::<Float64Type>();
            collect(array, |i| Value::Float64(a.value(i)))
        }
        DataType::Utf8 => {
            let a = array.as_string::<i32>();
            collect(array, |i| Value::Utf8(a.value(i).to_string()))
        }
        DataType::LargeUtf8 => {
            let a = array.as_string::<i64>();
            collect(array, |i| Value::Utf8(a.value(i).to_string()))
        }
        DataType::Utf8View => {
            let a = array.as_string_view();
            collect(array, |i| Value::Utf8(a.value(i).to_string()))
        }
        DataType::Boolean => {
            let a = array.as_boolean();
            collect(array, |i| Value::Bool(a.value(i)))
        }
        other => {
            return UnsupportedArrowTypeSnafu {
                column: column.to_string(),
                data_type: other.to_string(),
            }
            .fail();
        }
    })
}
