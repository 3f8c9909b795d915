//! Read path for [`TileArray`].
//!
//! A read resolves the open ends of its row range against the observed
//! extent, derives the overlapping tile indices arithmetically and then, per
//! tile:
//! - opens a [`TileReader`](crate::tile::TileReader) (prefix, header and row
//!   bitmap only),
//! - decodes the predicate's columns and filters rows,
//! - decodes the remaining projected columns only if some row survived.
//!
//! Columns that are neither projected nor referenced by the predicate are
//! never read from storage. Tiles are processed concurrently but yielded in
//! ascending tile order, so rows come out in ascending row-index order.

use std::{collections::HashMap, pin::Pin, sync::Arc};

use futures::{Stream, StreamExt, TryStreamExt, future, stream};
use snafu::prelude::*;

use crate::{
    predicate::{BoundPredicate, Predicate},
    schema::{ColumnDef, ResolvedRange, RowRange},
    table::Table,
    tile::TileStore,
    value::Value,
};

use super::{
    TileArray,
    error::{ArrayError, ColumnNotFoundSnafu},
};

/// Stream of per-tile result chunks, in ascending row order.
pub type TableScan = Pin<Box<dyn Stream<Item = Result<Table, ArrayError>> + Send + 'static>>;

/// Up to this many tiles, candidates are derived from the range alone;
/// wider ranges consult the tile listing to skip tiles never written.
const DIRECT_TILE_SPAN: u64 = 4096;

/// What to read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadRequest {
    /// Row range; open ends default to the observed extent.
    pub range: RowRange,
    /// Optional row filter.
    pub predicate: Option<Predicate>,
    /// Projected columns in output order; `None` means every column.
    pub columns: Option<Vec<String>>,
}

impl ReadRequest {
    /// Read every column of `range`.
    pub fn new(range: impl Into<RowRange>) -> Self {
        ReadRequest {
            range: range.into(),
            ..ReadRequest::default()
        }
    }

    /// Keep only rows matching `predicate`.
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Project to `columns`, in the given order.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug)]
struct ScanPlan {
    fields: Vec<ColumnDef>,
    projection: Vec<usize>,
    predicate: Option<BoundPredicate>,
    range: ResolvedRange,
}

impl TileArray {
    /// Read `range`, optionally filtered by `predicate` and projected to
    /// `columns`, into a single table.
    pub async fn read(
        &self,
        range: impl Into<RowRange>,
        predicate: Option<&Predicate>,
        columns: Option<&[&str]>,
    ) -> Result<Table, ArrayError> {
        let mut request = ReadRequest::new(range);
        request.predicate = predicate.cloned();
        if let Some(columns) = columns {
            request = request.with_columns(columns.iter().copied());
        }
        self.query(&request).await
    }

    /// Run `request` and collect the result.
    pub async fn query(&self, request: &ReadRequest) -> Result<Table, ArrayError> {
        let fields = self.projected_fields(request.columns.as_deref())?.1;
        let mut scan = self.scan(request.clone()).await?;
        let mut table = Table::empty(fields);
        while let Some(chunk) = scan.try_next().await? {
            table.append(chunk);
        }
        Ok(table)
    }

    /// Stream the result of `request` as one table chunk per non-empty tile.
    ///
    /// Column and predicate errors are reported before the stream is
    /// returned; storage and decoding errors surface as stream items.
    pub async fn scan(&self, request: ReadRequest) -> Result<TableScan, ArrayError> {
        let (projection, fields) = self.projected_fields(request.columns.as_deref())?;
        let predicate = request
            .predicate
            .as_ref()
            .map(|p| p.bind(self.schema()))
            .transpose()?;

        let Some(range) = request.range.resolve(self.extent()) else {
            return Ok(Box::pin(stream::empty()));
        };

        let store = self.store().clone();
        let first_tile = store.tile_index_for(range.scan_first);
        let last_tile = store.tile_index_for(range.scan_last);
        if first_tile > last_tile {
            return Ok(Box::pin(stream::empty()));
        }
        let candidates: Vec<u64> = if last_tile - first_tile < DIRECT_TILE_SPAN {
            (first_tile..=last_tile).collect()
        } else {
            store
                .list_tiles()
                .await?
                .into_iter()
                .filter(|t| (first_tile..=last_tile).contains(t))
                .collect()
        };

        let concurrency = self.io_options().resolve_tile_concurrency(candidates.len());
        let plan = Arc::new(ScanPlan {
            fields,
            projection,
            predicate,
            range,
        });

        let stream = stream::iter(candidates)
            .map(move |index| {
                let store = store.clone();
                let plan = Arc::clone(&plan);
                async move { read_tile_chunk(&store, index, &plan).await }
            })
            .buffered(concurrency)
            .try_filter(|chunk| future::ready(!chunk.is_empty()));

        Ok(Box::pin(stream))
    }

    /// Populated row indices within `range`, ascending.
    pub async fn row_indices(&self, range: impl Into<RowRange>) -> Result<Vec<u64>, ArrayError> {
        let request = ReadRequest::new(range).with_columns(Vec::<String>::new());
        let table = self.query(&request).await?;
        Ok(table.row_indices().to_vec())
    }

    fn projected_fields(
        &self,
        columns: Option<&[String]>,
    ) -> Result<(Vec<usize>, Vec<ColumnDef>), ArrayError> {
        let schema = self.schema();
        let projection: Vec<usize> = match columns {
            None => (0..schema.len()).collect(),
            Some(names) => names
                .iter()
                .map(|name| {
                    schema
                        .index_of(name)
                        .context(ColumnNotFoundSnafu { column: name })
                })
                .collect::<Result<_, _>>()?,
        };
        let fields = projection
            .iter()
            .map(|&p| schema.columns()[p].clone())
            .collect();
        Ok((projection, fields))
    }
}

async fn read_tile_chunk(
    store: &TileStore,
    index: u64,
    plan: &ScanPlan,
) -> Result<Table, ArrayError> {
    let Some(reader) = store.open_reader(index).await? else {
        return Ok(Table::empty(plan.fields.clone()));
    };

    let first_row = store.tile_start(index);
    let row_ids: Vec<u64> = reader
        .rows()
        .iter()
        .map(|offset| first_row + u64::from(offset))
        .collect();
    let in_range: Vec<usize> = row_ids
        .iter()
        .enumerate()
        .filter(|&(_, &row)| plan.range.contains(row))
        .map(|(i, _)| i)
        .collect();
    if in_range.is_empty() {
        return Ok(Table::empty(plan.fields.clone()));
    }

    let mut decoded: HashMap<usize, Vec<Value>> = HashMap::new();
    let selected = match &plan.predicate {
        Some(predicate) => {
            let mut values = Vec::with_capacity(predicate.columns().len());
            for &position in predicate.columns() {
                values.push(reader.read_column(position).await?);
            }
            let kept: Vec<usize> = in_range
                .into_iter()
                .filter(|&i| predicate.matches(&values, i))
                .collect();
            decoded.extend(predicate.columns().iter().copied().zip(values));
            kept
        }
        None => in_range,
    };
    if selected.is_empty() {
        return Ok(Table::empty(plan.fields.clone()));
    }

    for &position in &plan.projection {
        if !decoded.contains_key(&position) {
            let values = reader.read_column(position).await?;
            decoded.insert(position, values);
        }
    }

    let columns = plan
        .projection
        .iter()
        .map(|position| {
            let values = &decoded[position];
            selected.iter().map(|&i| values[i].clone()).collect()
        })
        .collect();
    let rows = selected.iter().map(|&i| row_ids[i]).collect();

    Ok(Table::from_parts(plan.fields.clone(), rows, columns))
}
