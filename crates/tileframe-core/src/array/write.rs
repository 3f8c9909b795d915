//! Write pipeline for [`TileArray`].
//!
//! A write proceeds in two phases:
//! - validation of the whole batch against the schema, the domain and (for
//!   dense arrays) the duplicate-row policy, before any tile is persisted;
//! - per-tile load, merge, encode and persist.
//!
//! Each tile is replaced atomically, but a batch spanning several tiles is
//! not: if persistence fails part way, tiles already persisted keep the new
//! rows and the error names the tile that failed.

use std::collections::{BTreeMap, HashSet};

use futures::{StreamExt, TryStreamExt, stream};
use log::debug;
use rayon::prelude::*;
use snafu::prelude::*;

use crate::{
    batch::Batch,
    codec,
    schema::{ArrayMode, DuplicateRowPolicy, Extent},
    tile::{Tile, TileError},
    value::Value,
};

use super::{
    TileArray,
    error::{
        ArrayError, DomainViolationSnafu, DuplicateBatchRowSnafu, InvalidValueSnafu,
        NullInRequiredColumnSnafu, UnknownColumnSnafu,
    },
};

/// Summary of a successful write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Number of rows written.
    pub rows_written: usize,
    /// `(tile index, new version)` for every tile persisted, ascending.
    pub tiles: Vec<(u64, u64)>,
}

/// A validated row: cells resolved to schema positions.
#[derive(Debug)]
struct PreparedRow<'b> {
    index: u64,
    cells: Vec<(usize, &'b Value)>,
}

impl TileArray {
    /// Write `batch` into the array.
    ///
    /// Sparse arrays accept any subset of columns per row; a given value
    /// sets the cell, an explicit null clears it and an absent column is left
    /// untouched. Dense arrays require every column on every row and
    /// overwrite the row as a whole.
    ///
    /// The batch is validated as a whole first: nothing is persisted if any
    /// row is invalid.
    pub async fn write_batch(&mut self, batch: &Batch) -> Result<WriteReport, ArrayError> {
        if batch.is_empty() {
            return Ok(WriteReport::default());
        }

        let prepared = self.prepare_batch(batch)?;

        let mut by_tile: BTreeMap<u64, Vec<PreparedRow<'_>>> = BTreeMap::new();
        for row in prepared {
            by_tile
                .entry(self.store().tile_index_for(row.index))
                .or_default()
                .push(row);
        }

        let store = self.store();
        let concurrency = self.io_options().resolve_tile_concurrency(by_tile.len());

        let mut tiles: Vec<Tile> = stream::iter(by_tile.keys().copied())
            .map(|index| async move { store.get_or_create_tile(store.tile_start(index)).await })
            .buffered(concurrency)
            .try_collect()
            .await?;

        if self.mode() == ArrayMode::Dense
            && self.meta().duplicate_rows() == DuplicateRowPolicy::Reject
        {
            for (tile, rows) in tiles.iter().zip(by_tile.values()) {
                if let Some(row) = rows.iter().find(|r| tile.contains_row(r.index)) {
                    return DomainViolationSnafu {
                        row: row.index,
                        msg: "row is already written and duplicate rows are rejected",
                    }
                    .fail();
                }
            }
        }

        for (tile, rows) in tiles.iter_mut().zip(by_tile.values()) {
            for row in rows {
                let offset = tile.offset_of(row.index).context(DomainViolationSnafu {
                    row: row.index,
                    msg: "row index does not map into its tile",
                })?;
                tile.merge_row(offset, row.cells.iter().copied());
            }
        }

        let encoded: Vec<Vec<u8>> = tiles
            .par_iter()
            .map(|tile| store.encode(tile))
            .collect::<Result<_, TileError>>()?;

        let outcomes: Vec<Result<u64, TileError>> = stream::iter(tiles.iter().zip(&encoded))
            .map(|(tile, bytes)| store.persist_encoded(tile.index(), tile.version(), bytes))
            .buffered(concurrency)
            .collect()
            .await;

        let mut report = WriteReport::default();
        let mut first_error = None;
        let mut written = None;
        for ((tile, rows), outcome) in tiles.iter().zip(by_tile.values()).zip(outcomes) {
            match outcome {
                Ok(version) => {
                    report.tiles.push((tile.index(), version));
                    report.rows_written += rows.len();
                    for row in rows {
                        written = Some(Extent::merge(written, Extent::single(row.index)));
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(extent) = written {
            self.observe(extent);
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }

        debug!(
            "wrote {} rows across {} tiles at {}",
            report.rows_written,
            report.tiles.len(),
            self.location()
        );
        Ok(report)
    }

    fn prepare_batch<'b>(&self, batch: &'b Batch) -> Result<Vec<PreparedRow<'b>>, ArrayError> {
        let schema = self.schema();
        let domain = self.domain();
        let dense = self.mode() == ArrayMode::Dense;

        let mut seen = HashSet::with_capacity(batch.len());
        let mut prepared = Vec::with_capacity(batch.len());

        for row in batch.rows() {
            let index = row.index();
            ensure!(seen.insert(index), DuplicateBatchRowSnafu { row: index });
            ensure!(
                domain.contains(index),
                DomainViolationSnafu {
                    row: index,
                    msg: format!("row index outside domain {domain}"),
                }
            );

            let mut cells = Vec::with_capacity(row.cells().len());
            for (name, value) in row.cells() {
                let position = schema.index_of(name).with_context(|| UnknownColumnSnafu {
                    row: index,
                    column: name,
                })?;
                let def = &schema.columns()[position];
                codec::check(def.column_type, value).with_context(|_| InvalidValueSnafu {
                    row: index,
                    column: name,
                })?;
                ensure!(
                    def.nullable || !value.is_null(),
                    NullInRequiredColumnSnafu {
                        row: index,
                        column: name,
                    }
                );
                cells.push((position, value));
            }

            if dense && cells.len() != schema.len() {
                let missing = schema
                    .columns()
                    .iter()
                    .filter(|c| !row.cells().contains_key(&c.name))
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return DomainViolationSnafu {
                    row: index,
                    msg: format!("dense row is missing required columns: {missing}"),
                }
                .fail();
            }

            cells.sort_unstable_by_key(|(position, _)| *position);
            prepared.push(PreparedRow { index, cells });
        }

        Ok(prepared)
    }
}
