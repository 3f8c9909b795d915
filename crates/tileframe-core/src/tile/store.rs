//! Tile persistence and retrieval.
//!
//! Each tile lives in its own directory holding immutable version files and
//! a `CURRENT` pointer. Persisting a tile:
//!
//! 1. Encode the tile into a new version file created with "create only if
//!    not exists" semantics.
//! 2. Atomically replace `CURRENT` (temp + rename) with the new version.
//!
//! Readers resolve `CURRENT` first and then read only the immutable file it
//! names, so they observe a tile either entirely before or entirely after a
//! write. If a crash happens between the two steps the orphaned version file
//! is ignored by readers and skipped over by the next persist.

use std::{path::PathBuf, sync::Arc};

use log::{debug, warn};
use roaring::RoaringBitmap;
use snafu::prelude::*;

use crate::{
    schema::ArrayMeta,
    storage::{self, ArrayLocation, StorageError, layout},
    value::Value,
};

use super::{
    CorruptSnafu, StorageSnafu, Tile, TileError,
    format::{self, PREFIX_LEN, TileHeader},
};

/// Outcome of vacuuming one tile directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileVacuum {
    /// Superseded version files removed.
    pub removed_versions: u64,
    /// Leftover temp files removed.
    pub removed_temp_files: u64,
}

/// Reads and writes tiles of one array.
#[derive(Debug, Clone)]
pub struct TileStore {
    location: ArrayLocation,
    meta: Arc<ArrayMeta>,
}

impl TileStore {
    /// Create a store for the array rooted at `location`.
    pub fn new(location: ArrayLocation, meta: Arc<ArrayMeta>) -> Self {
        TileStore { location, meta }
    }

    /// Rows per tile.
    pub fn capacity(&self) -> u64 {
        self.meta.tile_capacity()
    }

    /// Index of the tile holding `row`: `floor(row / capacity)`.
    pub fn tile_index_for(&self, row: u64) -> u64 {
        row / self.capacity()
    }

    /// First row covered by tile `index`.
    pub fn tile_start(&self, index: u64) -> u64 {
        index.saturating_mul(self.capacity())
    }

    fn empty_tile(&self, index: u64) -> Tile {
        Tile::empty(
            index,
            self.capacity(),
            self.meta.mode(),
            self.meta.schema().len(),
        )
    }

    /// Live version of tile `index`, or `None` if the tile was never persisted.
    pub async fn current_version(&self, index: u64) -> Result<Option<u64>, TileError> {
        let rel = layout::tile_current_rel_path(index);
        let contents = match storage::read_to_string(&self.location, &rel).await {
            Ok(s) => s,
            Err(StorageError::NotFound { .. }) => return Ok(None),
            Err(source) => {
                return Err(TileError::Storage {
                    tile: index,
                    operation: "read CURRENT",
                    source,
                });
            }
        };

        let trimmed = contents.trim();
        ensure!(
            !trimmed.is_empty(),
            CorruptSnafu {
                tile: index,
                msg: format!("CURRENT has empty content at {rel:?}"),
            }
        );
        let version = trimmed.parse::<u64>().map_err(|e| {
            CorruptSnafu {
                tile: index,
                msg: format!("CURRENT has invalid content {trimmed:?}: {e}"),
            }
            .build()
        })?;
        Ok(Some(version))
    }

    /// Load the whole tile covering `row_range_start`, or `None` if it has
    /// never been persisted.
    pub async fn read_tile(&self, row_range_start: u64) -> Result<Option<Tile>, TileError> {
        self.load_tile(self.tile_index_for(row_range_start)).await
    }

    /// Load the tile covering `row_range_start`, or an empty one if it has
    /// never been persisted.
    pub async fn get_or_create_tile(&self, row_range_start: u64) -> Result<Tile, TileError> {
        let index = self.tile_index_for(row_range_start);
        Ok(match self.load_tile(index).await? {
            Some(tile) => tile,
            None => self.empty_tile(index),
        })
    }

    async fn load_tile(&self, index: u64) -> Result<Option<Tile>, TileError> {
        let Some(version) = self.current_version(index).await? else {
            return Ok(None);
        };
        let rel = layout::tile_version_rel_path(index, version);
        let bytes = storage::read_all_bytes(&self.location, &rel)
            .await
            .context(StorageSnafu {
                tile: index,
                operation: "read tile",
            })?;
        let tile = format::decode_tile(
            &bytes,
            index,
            version,
            self.capacity(),
            self.meta.mode(),
            self.meta.schema(),
        )?;
        Ok(Some(tile))
    }

    /// Encode `tile` into version file bytes. CPU only; no I/O.
    pub fn encode(&self, tile: &Tile) -> Result<Vec<u8>, TileError> {
        format::encode_tile(tile, self.meta.schema())
    }

    /// Encode and persist `tile`, updating its version on success.
    pub async fn persist(&self, tile: &mut Tile) -> Result<u64, TileError> {
        let bytes = self.encode(tile)?;
        let version = self
            .persist_encoded(tile.index(), tile.version(), &bytes)
            .await?;
        tile.set_version(version);
        Ok(version)
    }

    /// Write already-encoded tile bytes as the next version of tile `index`
    /// and swap `CURRENT` to it.
    ///
    /// `base_version` is the version the bytes were derived from. If a file
    /// for `base_version + 1` already exists (left behind by an interrupted
    /// write), the next free version above every existing file is used.
    pub async fn persist_encoded(
        &self,
        index: u64,
        base_version: u64,
        bytes: &[u8],
    ) -> Result<u64, TileError> {
        let mut version = base_version.checked_add(1).context(CorruptSnafu {
            tile: index,
            msg: "tile version counter overflow".to_string(),
        })?;

        let rel = layout::tile_version_rel_path(index, version);
        match storage::write_new(&self.location, &rel, bytes).await {
            Ok(()) => {}
            Err(StorageError::AlreadyExists { .. }) => {
                let newest = self.list_versions(index).await?.into_iter().max();
                let next = newest.unwrap_or(base_version).max(base_version);
                version = next.checked_add(1).context(CorruptSnafu {
                    tile: index,
                    msg: "tile version counter overflow".to_string(),
                })?;
                warn!(
                    "tile {index}: skipping orphaned version file(s), writing version {version}"
                );
                let rel = layout::tile_version_rel_path(index, version);
                storage::write_new(&self.location, &rel, bytes)
                    .await
                    .context(StorageSnafu {
                        tile: index,
                        operation: "write tile version",
                    })?;
            }
            Err(source) => {
                return Err(TileError::Storage {
                    tile: index,
                    operation: "write tile version",
                    source,
                });
            }
        }

        let current = format!("{version}\n");
        storage::write_atomic(
            &self.location,
            &layout::tile_current_rel_path(index),
            current.as_bytes(),
        )
        .await
        .context(StorageSnafu {
            tile: index,
            operation: "swap CURRENT",
        })?;

        debug!(
            "persisted tile {index} version {version} ({} bytes) at {}",
            bytes.len(),
            self.location
        );
        Ok(version)
    }

    /// Open a reader on the live version of tile `index`.
    ///
    /// Returns `None` if the tile was never persisted.
    pub async fn open_reader(&self, index: u64) -> Result<Option<TileReader>, TileError> {
        let Some(version) = self.current_version(index).await? else {
            return Ok(None);
        };
        TileReader::open(self.location.clone(), Arc::clone(&self.meta), index, version)
            .await
            .map(Some)
    }

    /// Indices of all tile directories, ascending.
    pub async fn list_tiles(&self) -> Result<Vec<u64>, TileError> {
        let names = storage::list_dir(&self.location, &layout::tiles_rel_dir())
            .await
            .context(StorageSnafu {
                tile: 0u64,
                operation: "list tiles",
            })?;
        let mut indices: Vec<u64> = names
            .iter()
            .filter_map(|n| layout::parse_tile_dir_name(n))
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }

    async fn list_versions(&self, index: u64) -> Result<Vec<u64>, TileError> {
        let names = storage::list_dir(&self.location, &layout::tile_rel_dir(index))
            .await
            .context(StorageSnafu {
                tile: index,
                operation: "list versions",
            })?;
        Ok(names
            .iter()
            .filter_map(|n| layout::parse_tile_version_file_name(n))
            .collect())
    }

    /// Remove every version file of tile `index` except the live one, plus
    /// leftover temp files.
    ///
    /// Readers that resolved `CURRENT` before a write and are still reading
    /// the superseded file will fail; do not run concurrently with readers.
    pub async fn vacuum_tile(&self, index: u64) -> Result<TileVacuum, TileError> {
        let mut report = TileVacuum::default();
        let Some(current) = self.current_version(index).await? else {
            warn!("tile {index} has no CURRENT pointer; leaving it untouched");
            return Ok(report);
        };

        let dir = layout::tile_rel_dir(index);
        let names = storage::list_dir(&self.location, &dir)
            .await
            .context(StorageSnafu {
                tile: index,
                operation: "list versions",
            })?;

        for name in names {
            let stale_version = layout::parse_tile_version_file_name(&name)
                .is_some_and(|v| v != current);
            let temp = name.ends_with(".tmp");
            if !stale_version && !temp {
                continue;
            }
            if temp {
                warn!("tile {index}: removing stale temp file {name}");
            }
            let rel: PathBuf = dir.join(&name);
            storage::remove_file(&self.location, &rel)
                .await
                .context(StorageSnafu {
                    tile: index,
                    operation: "vacuum",
                })?;
            if temp {
                report.removed_temp_files += 1;
            } else {
                report.removed_versions += 1;
            }
        }
        Ok(report)
    }
}

/// Reader over one immutable tile version that fetches sections on demand.
///
/// Opening a reader fetches the prefix, the header and the row bitmap.
/// Column values are only read by [`TileReader::read_column`].
#[derive(Debug)]
pub struct TileReader {
    location: ArrayLocation,
    index: u64,
    version: u64,
    rel_path: PathBuf,
    header: TileHeader,
    data_start: u64,
    rows: RoaringBitmap,
}

impl TileReader {
    async fn open(
        location: ArrayLocation,
        meta: Arc<ArrayMeta>,
        index: u64,
        version: u64,
    ) -> Result<Self, TileError> {
        let rel_path = layout::tile_version_rel_path(index, version);

        let prefix = storage::read_range(&location, &rel_path, 0, PREFIX_LEN)
            .await
            .context(StorageSnafu {
                tile: index,
                operation: "read tile prefix",
            })?;
        let header_len = u64::from(format::decode_prefix(index, &prefix)?);

        let header_bytes = storage::read_range(&location, &rel_path, PREFIX_LEN, header_len)
            .await
            .context(StorageSnafu {
                tile: index,
                operation: "read tile header",
            })?;
        let header = format::decode_header(index, &header_bytes)?;
        header.validate(index, meta.tile_capacity(), meta.mode(), meta.schema())?;

        let mut reader = TileReader {
            location,
            index,
            version,
            rel_path,
            header,
            data_start: PREFIX_LEN + header_len,
            rows: RoaringBitmap::new(),
        };
        let rows_section = reader.header.rows;
        let rows_bytes = reader.read_section(rows_section, "read row bitmap").await?;
        reader.rows = format::bitmap_from_bytes(index, &rows_bytes)?;
        format::check_row_offsets(index, &reader.rows, meta.tile_capacity())?;
        ensure!(
            reader.rows.len() == reader.header.row_count,
            CorruptSnafu {
                tile: index,
                msg: format!(
                    "row bitmap has {} rows, header says {}",
                    reader.rows.len(),
                    reader.header.row_count
                ),
            }
        );
        Ok(reader)
    }

    async fn read_section(
        &self,
        section: format::Section,
        operation: &'static str,
    ) -> Result<Vec<u8>, TileError> {
        let offset = self.data_start.checked_add(section.offset).context(CorruptSnafu {
            tile: self.index,
            msg: format!("section offset {} overflows", section.offset),
        })?;
        storage::read_range(&self.location, &self.rel_path, offset, section.len)
            .await
            .context(StorageSnafu {
                tile: self.index,
                operation,
            })
    }

    /// Tile index.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Version being read.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Bitmap of populated row offsets.
    pub fn rows(&self) -> &RoaringBitmap {
        &self.rows
    }

    /// Read column `position` as values aligned with [`Self::rows`]; cells
    /// absent from a sparse column are null.
    pub async fn read_column(&self, position: usize) -> Result<Vec<Value>, TileError> {
        let section = self.header.columns.get(position).context(CorruptSnafu {
            tile: self.index,
            msg: format!("no column at position {position}"),
        })?;

        let presence = match section.presence {
            Some(p) => {
                let bytes = self.read_section(p, "read presence bitmap").await?;
                Some(format::bitmap_from_bytes(self.index, &bytes)?)
            }
            None => None,
        };
        let values = self.read_section(section.values, "read column values").await?;
        format::decode_column_aligned(self.index, section, &self.rows, presence.as_ref(), &values)
    }
}
