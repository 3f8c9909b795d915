//! Tiles: fixed-capacity row ranges, the unit of persistence and I/O.
//!
//! A tile with index `t` owns rows `[t * capacity, (t + 1) * capacity)`, so
//! locating the tile for a row is a division, never an index lookup. Each
//! tile tracks:
//!
//! - a roaring bitmap of the populated row offsets,
//! - per column, the stored cells keyed by row offset.
//!
//! In dense mode every populated row has an entry (possibly null) in every
//! column. In sparse mode a column only holds the cells that were set; the
//! key set doubles as the column's presence bitmap when the tile is encoded.
//!
//! [`format`] defines the byte layout and [`TileStore`] persists tiles with
//! write-new-version-then-swap-pointer semantics.

pub mod format;
mod store;

pub use store::{TileReader, TileStore, TileVacuum};

use std::collections::BTreeMap;

use roaring::RoaringBitmap;
use snafu::{Backtrace, prelude::*};

use crate::{
    codec::CodecError,
    schema::ArrayMode,
    storage::StorageError,
    value::Value,
};

/// Errors raised by the tile store and the tile format.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TileError {
    /// Underlying storage failed while operating on a tile.
    #[snafu(display("Storage error on tile {tile} during {operation}: {source}"))]
    Storage {
        /// Tile index.
        tile: u64,
        /// What the store was doing.
        operation: &'static str,
        /// Underlying storage error.
        source: StorageError,
    },

    /// The persisted tile is structurally invalid.
    #[snafu(display("Corrupt tile {tile}: {msg}"))]
    Corrupt {
        /// Tile index.
        tile: u64,
        /// Description of the problem.
        msg: String,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// The tile header JSON could not be read or written.
    #[snafu(display("Invalid header for tile {tile}: {source}"))]
    Header {
        /// Tile index.
        tile: u64,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A roaring bitmap section could not be read or written.
    #[snafu(display("Invalid bitmap in tile {tile}: {source}"))]
    Bitmap {
        /// Tile index.
        tile: u64,
        /// Underlying I/O error from the roaring codec.
        source: std::io::Error,
    },

    /// Column values could not be encoded or decoded.
    #[snafu(display("Codec error in tile {tile}, column {column}: {source}"))]
    Codec {
        /// Tile index.
        tile: u64,
        /// Column name.
        column: String,
        /// Underlying codec error.
        source: CodecError,
    },
}

impl TileError {
    /// True when the error means the stored bytes are damaged, as opposed to
    /// the storage layer failing to deliver them.
    pub fn is_corrupt(&self) -> bool {
        match self {
            TileError::Storage { source, .. } => {
                matches!(source, StorageError::ShortRead { .. })
            }
            TileError::Corrupt { .. } | TileError::Header { .. } | TileError::Bitmap { .. } => {
                true
            }
            TileError::Codec { source, .. } => source.is_corrupt(),
        }
    }

    /// The tile this error refers to.
    pub fn tile(&self) -> u64 {
        match self {
            TileError::Storage { tile, .. }
            | TileError::Corrupt { tile, .. }
            | TileError::Header { tile, .. }
            | TileError::Bitmap { tile, .. }
            | TileError::Codec { tile, .. } => *tile,
        }
    }
}

/// Stored cells of one column within a tile, keyed by row offset.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TileColumn {
    pub(crate) cells: BTreeMap<u32, Value>,
}

/// An in-memory tile, loaded from storage or freshly created.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    index: u64,
    capacity: u64,
    version: u64,
    mode: ArrayMode,
    rows: RoaringBitmap,
    columns: Vec<TileColumn>,
}

impl Tile {
    /// A tile with no rows and no persisted version.
    pub fn empty(index: u64, capacity: u64, mode: ArrayMode, column_count: usize) -> Self {
        Tile {
            index,
            capacity,
            version: 0,
            mode,
            rows: RoaringBitmap::new(),
            columns: vec![TileColumn::default(); column_count],
        }
    }

    pub(crate) fn from_parts(
        index: u64,
        capacity: u64,
        version: u64,
        mode: ArrayMode,
        rows: RoaringBitmap,
        columns: Vec<TileColumn>,
    ) -> Self {
        Tile {
            index,
            capacity,
            version,
            mode,
            rows,
            columns,
        }
    }

    /// Tile index.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Rows per tile.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Persisted version this tile was loaded from; 0 if never persisted.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Layout mode.
    pub fn mode(&self) -> ArrayMode {
        self.mode
    }

    /// First row index covered by this tile.
    pub fn first_row(&self) -> u64 {
        self.index.saturating_mul(self.capacity)
    }

    /// Bitmap of populated row offsets.
    pub fn rows(&self) -> &RoaringBitmap {
        &self.rows
    }

    /// Number of populated rows.
    pub fn row_count(&self) -> u64 {
        self.rows.len()
    }

    /// True when no row is populated.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn columns(&self) -> &[TileColumn] {
        &self.columns
    }

    /// Offset of `row` inside this tile, if the tile covers it.
    pub fn offset_of(&self, row: u64) -> Option<u32> {
        let first = self.first_row();
        if row < first || row - first >= self.capacity {
            return None;
        }
        u32::try_from(row - first).ok()
    }

    /// Whether `row` is populated in this tile.
    pub fn contains_row(&self, row: u64) -> bool {
        self.offset_of(row)
            .is_some_and(|offset| self.rows.contains(offset))
    }

    /// The stored cell for `(row, column)`. `None` if the cell is absent.
    pub fn cell(&self, row: u64, column: usize) -> Option<&Value> {
        let offset = self.offset_of(row)?;
        self.columns.get(column)?.cells.get(&offset)
    }

    /// Merge one row into the tile.
    ///
    /// `cells` pairs column positions with values. Dense tiles overwrite the
    /// whole row positionally and unspecified columns become null. Sparse
    /// tiles set the given cells, clear the ones given as null, and leave the
    /// rest untouched.
    pub(crate) fn merge_row<'a>(
        &mut self,
        offset: u32,
        cells: impl IntoIterator<Item = (usize, &'a Value)>,
    ) {
        self.rows.insert(offset);
        match self.mode {
            ArrayMode::Dense => {
                for column in &mut self.columns {
                    column.cells.insert(offset, Value::Null);
                }
                for (pos, value) in cells {
                    if let Some(column) = self.columns.get_mut(pos) {
                        column.cells.insert(offset, value.clone());
                    }
                }
            }
            ArrayMode::Sparse => {
                for (pos, value) in cells {
                    let Some(column) = self.columns.get_mut(pos) else {
                        continue;
                    };
                    if value.is_null() {
                        column.cells.remove(&offset);
                    } else {
                        column.cells.insert(offset, value.clone());
                    }
                }
            }
        }
    }
}
