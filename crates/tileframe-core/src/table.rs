//! Query results: an ordered-row table keyed by row index.

use std::sync::Arc;

use arrow::{
    array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, UInt64Array},
    datatypes::{DataType, Field, Schema as ArrowSchema},
    error::ArrowError,
    record_batch::RecordBatch,
};

use crate::{
    schema::{ColumnDef, ColumnType},
    value::Value,
};

/// Columnar result of a read.
///
/// Rows are in ascending row-index order. Every column vector has one entry
/// per row; unpopulated sparse cells are [`Value::Null`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    fields: Vec<ColumnDef>,
    row_indices: Vec<u64>,
    columns: Vec<Vec<Value>>,
}

impl Table {
    /// An empty table with the given projected columns.
    pub fn empty(fields: Vec<ColumnDef>) -> Self {
        let columns = vec![Vec::new(); fields.len()];
        Table {
            fields,
            row_indices: Vec::new(),
            columns,
        }
    }

    pub(crate) fn from_parts(
        fields: Vec<ColumnDef>,
        row_indices: Vec<u64>,
        columns: Vec<Vec<Value>>,
    ) -> Self {
        debug_assert_eq!(fields.len(), columns.len());
        debug_assert!(columns.iter().all(|c| c.len() == row_indices.len()));
        Table {
            fields,
            row_indices,
            columns,
        }
    }

    /// Append the rows of `other`, which must have the same fields and
    /// start after this table's last row.
    pub(crate) fn append(&mut self, other: Table) {
        debug_assert_eq!(self.fields, other.fields);
        self.row_indices.extend(other.row_indices);
        for (mine, theirs) in self.columns.iter_mut().zip(other.columns) {
            mine.extend(theirs);
        }
    }

    /// Projected column definitions.
    pub fn fields(&self) -> &[ColumnDef] {
        &self.fields
    }

    /// Projected column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.row_indices.len()
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.fields.len()
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_columns())
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.row_indices.is_empty()
    }

    /// Row indices, ascending.
    pub fn row_indices(&self) -> &[u64] {
        &self.row_indices
    }

    /// Values of the column named `name`.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        let pos = self.fields.iter().position(|f| f.name == name)?;
        Some(&self.columns[pos])
    }

    /// Values of the column at `position`.
    pub fn column_at(&self, position: usize) -> Option<&[Value]> {
        self.columns.get(position).map(Vec::as_slice)
    }

    /// Position of `row_index` among the table's rows.
    pub fn position_of(&self, row_index: u64) -> Option<usize> {
        self.row_indices.binary_search(&row_index).ok()
    }

    /// The cell at `(row_index, column)`.
    pub fn get(&self, row_index: u64, column: &str) -> Option<&Value> {
        let row = self.position_of(row_index)?;
        self.column(column)?.get(row)
    }

    /// All cells of the row at `row_index`, in column order.
    pub fn row(&self, row_index: u64) -> Option<Vec<&Value>> {
        let row = self.position_of(row_index)?;
        Some(self.columns.iter().map(|c| &c[row]).collect())
    }

    /// Convert to an Arrow record batch.
    ///
    /// With `index_column`, row indices are prepended as a non-null `UInt64`
    /// column of that name.
    pub fn to_record_batch(&self, index_column: Option<&str>) -> Result<RecordBatch, ArrowError> {
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.fields.len() + 1);

        if let Some(name) = index_column {
            fields.push(Field::new(name, DataType::UInt64, false));
            arrays.push(Arc::new(UInt64Array::from(self.row_indices.clone())));
        }

        for (def, values) in self.fields.iter().zip(&self.columns) {
            // Sparse reads can yield nulls even in columns declared non-null.
            fields.push(Field::new(
                def.name.clone(),
                def.column_type.to_arrow_datatype(),
                true,
            ));
            let array: ArrayRef = match def.column_type {
                ColumnType::Int64 => Arc::new(Int64Array::from(
                    values.iter().map(Value::as_i64).collect::<Vec<_>>(),
                )),
                ColumnType::Float64 => Arc::new(Float64Array::from(
                    values.iter().map(Value::as_f64).collect::<Vec<_>>(),
                )),
                ColumnType::Utf8 => Arc::new(StringArray::from(
                    values.iter().map(Value::as_str).collect::<Vec<_>>(),
                )),
                ColumnType::Bool => Arc::new(BooleanArray::from(
                    values.iter().map(Value::as_bool).collect::<Vec<_>>(),
                )),
            };
            arrays.push(array);
        }

        RecordBatch::try_new(Arc::new(ArrowSchema::new(fields)), arrays)
    }
}
