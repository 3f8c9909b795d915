//! The [`Frame`] facade: dataframe-style access to one tile array.
//!
//! Every method translates its arguments into a [`TileArray`] call; the
//! storage, validation and query semantics all live in `tileframe-core`.

use arrow::record_batch::RecordBatch;
use log::debug;
use tileframe_core::{
    ArrayError, ArrayLocation, ArrayMeta, ArrayMode, Batch, BatchError, ColumnDef, ColumnType,
    Domain, Predicate, ReadRequest, RowRange, Schema, Table, TileArray, VacuumReport,
    WriteReport,
};

use crate::select::Selection;

/// A dense or sparse frame backed by a tile array.
#[derive(Debug, Clone)]
pub struct Frame {
    array: TileArray,
}

fn parse_location(uri: &str) -> Result<ArrayLocation, ArrayError> {
    ArrayLocation::parse(uri).map_err(|source| ArrayError::Storage {
        operation: "parse location",
        source,
    })
}

impl Frame {
    /// Create a new frame at `uri` (a path or `file://` URI).
    ///
    /// Pass [`Domain::full`] to allow appends at any row index.
    pub async fn create(
        uri: &str,
        schema: Schema,
        domain: Domain,
        mode: ArrayMode,
    ) -> Result<Self, ArrayError> {
        Self::create_with_meta(uri, ArrayMeta::new(schema, domain, mode)).await
    }

    /// Create a new frame with fully specified metadata.
    pub async fn create_with_meta(uri: &str, meta: ArrayMeta) -> Result<Self, ArrayError> {
        let array = TileArray::create(parse_location(uri)?, meta).await?;
        Ok(Frame { array })
    }

    /// Create a new frame at `uri`, replacing any existing one.
    pub async fn create_or_replace(uri: &str, meta: ArrayMeta) -> Result<Self, ArrayError> {
        let array = TileArray::create_or_replace(parse_location(uri)?, meta).await?;
        Ok(Frame { array })
    }

    /// Create a frame whose schema is inferred from `batch`, then write it.
    ///
    /// With `index_column`, row indices come from that column; otherwise
    /// rows are numbered from 0. The domain is full, so later appends may
    /// use any row index.
    pub async fn create_from_record_batch(
        uri: &str,
        batch: &RecordBatch,
        index_column: Option<&str>,
        mode: ArrayMode,
    ) -> Result<Self, ArrayError> {
        let arrow_schema = batch.schema();
        let mut columns = Vec::with_capacity(arrow_schema.fields().len());
        for field in arrow_schema.fields() {
            if Some(field.name().as_str()) == index_column {
                continue;
            }
            let column_type = ColumnType::from_arrow_datatype(field.data_type()).ok_or_else(|| {
                BatchError::UnsupportedArrowType {
                    column: field.name().clone(),
                    data_type: field.data_type().to_string(),
                }
            })?;
            columns.push(ColumnDef {
                name: field.name().clone(),
                column_type,
                nullable: field.is_nullable(),
            });
        }
        let schema =
            Schema::new(columns).map_err(|source| ArrayError::InvalidSchema { source })?;

        let mut frame = Self::create(uri, schema, Domain::full(), mode).await?;
        let rows = Batch::from_record_batch(batch, index_column, 0)?;
        frame.write_batch(&rows).await?;
        debug!("created frame at {uri} from a {}-row record batch", rows.len());
        Ok(frame)
    }

    /// Open an existing frame.
    pub async fn open(uri: &str) -> Result<Self, ArrayError> {
        let array = TileArray::open(parse_location(uri)?).await?;
        Ok(Frame { array })
    }

    /// Wrap an already opened array.
    pub fn from_array(array: TileArray) -> Self {
        Frame { array }
    }

    /// The underlying array.
    pub fn array(&self) -> &TileArray {
        &self.array
    }

    /// Unwrap into the underlying array.
    pub fn into_array(self) -> TileArray {
        self.array
    }

    /// `(rows, columns)`; rows is the largest written row index plus one.
    pub fn shape(&self) -> (u64, usize) {
        self.array.shape()
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<&str> {
        self.array
            .schema()
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Layout mode.
    pub fn mode(&self) -> ArrayMode {
        self.array.mode()
    }

    /// Populated row indices, ascending.
    pub async fn index(&self) -> Result<Vec<u64>, ArrayError> {
        self.array.row_indices(RowRange::all()).await
    }

    /// All columns of the rows in `rows`.
    pub async fn slice(&self, rows: impl Into<RowRange>) -> Result<Table, ArrayError> {
        self.array.read(rows, None, None).await
    }

    /// The given columns of the rows in `rows`.
    pub async fn slice_columns(
        &self,
        rows: impl Into<RowRange>,
        columns: &[&str],
    ) -> Result<Table, ArrayError> {
        self.array.read(rows, None, Some(columns)).await
    }

    /// The single row `index`; empty if it is not populated.
    pub async fn row(&self, index: u64) -> Result<Table, ArrayError> {
        self.slice(RowRange::single(index)).await
    }

    /// All columns of the rows matching `condition`, e.g. `"expression > 5.0"`.
    pub async fn query(&self, condition: &str) -> Result<Table, ArrayError> {
        let predicate = Predicate::parse(condition)?;
        self.array
            .query(&ReadRequest::new(RowRange::all()).with_predicate(predicate))
            .await
    }

    /// The given columns of the rows matching `condition`.
    pub async fn query_columns(
        &self,
        condition: &str,
        columns: &[&str],
    ) -> Result<Table, ArrayError> {
        let predicate = Predicate::parse(condition)?;
        let request = ReadRequest::new(RowRange::all())
            .with_predicate(predicate)
            .with_columns(columns.iter().copied());
        self.array.query(&request).await
    }

    /// Start a fluent selection combining rows, columns and a condition.
    pub fn select(&self) -> Selection<'_> {
        Selection::new(self)
    }

    /// Write `batch`; see [`TileArray::write_batch`].
    pub async fn write_batch(&mut self, batch: &Batch) -> Result<WriteReport, ArrayError> {
        self.array.write_batch(batch).await
    }

    /// Write an Arrow record batch.
    ///
    /// With `index_column`, row indices come from that column. Otherwise the
    /// rows are appended after the current last row.
    pub async fn write_record_batch(
        &mut self,
        batch: &RecordBatch,
        index_column: Option<&str>,
    ) -> Result<WriteReport, ArrayError> {
        let start_row = self.shape().0;
        let rows = Batch::from_record_batch(batch, index_column, start_row)?;
        self.write_batch(&rows).await
    }

    /// Pick up writes made through other handles.
    pub async fn refresh(&mut self) -> Result<(), ArrayError> {
        self.array.refresh().await
    }

    /// Remove superseded tile versions; see [`TileArray::vacuum`].
    pub async fn vacuum(&self) -> Result<VacuumReport, ArrayError> {
        self.array.vacuum().await
    }
}
