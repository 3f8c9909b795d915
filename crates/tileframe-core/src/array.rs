//! Array handles: lifecycle, introspection, writes and reads.
//!
//! A [`TileArray`] owns the persisted [`ArrayMeta`] of one array plus a
//! [`TileStore`] over its tiles. The handle also caches the observed row
//! [`Extent`], which drives `shape` and resolves open-ended row ranges.
//!
//! Submodules:
//! - `error`: [`ArrayError`] and the [`ErrorKind`] taxonomy.
//! - `write`: batch validation, tile merge and persistence.
//! - `read`: range reads, predicate filtering and the per-tile scan stream.
//! - `maintenance`: vacuuming superseded tile versions.
//!
//! Concurrency model: one writer per array at a time (callers serialize
//! writes), any number of readers. Readers never observe a half-written tile.
//! A handle does not see writes made through other handles until
//! [`TileArray::refresh`] is called.

mod error;
mod maintenance;
mod read;
mod write;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::{ArrayError, ErrorKind};
pub use maintenance::VacuumReport;
pub use read::{ReadRequest, TableScan};
pub use write::WriteReport;

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use log::{debug, warn};
use snafu::prelude::*;

use crate::{
    options::IoOptions,
    schema::{ArrayMeta, ArrayMode, Domain, Extent, Schema},
    storage::{self, ArrayLocation, StorageError, layout},
    tile::{TileError, TileStore},
};

use error::{
    AlreadyExistsSnafu, InvalidSchemaSnafu, MetaInvalidSnafu, MetaParseSnafu, NotFoundSnafu,
    StorageSnafu,
};

/// Handle to one persisted tile array.
#[derive(Debug, Clone)]
pub struct TileArray {
    location: ArrayLocation,
    meta: Arc<ArrayMeta>,
    store: TileStore,
    extent: Option<Extent>,
    io: IoOptions,
}

impl TileArray {
    /// Create a new array at `location`.
    ///
    /// Fails with [`ErrorKind::AlreadyExists`] if the location already holds
    /// array metadata or tiles.
    pub async fn create(location: ArrayLocation, meta: ArrayMeta) -> Result<Self, ArrayError> {
        meta.validate().context(InvalidSchemaSnafu)?;

        let meta_path = layout::array_meta_rel_path();
        let meta_exists = storage::exists(&location, &meta_path)
            .await
            .context(StorageSnafu {
                operation: "check array metadata",
            })?;
        let has_tiles = !storage::list_dir(&location, &layout::tiles_rel_dir())
            .await
            .context(StorageSnafu {
                operation: "list tiles",
            })?
            .is_empty();
        ensure!(
            !meta_exists && !has_tiles,
            AlreadyExistsSnafu {
                location: location.to_string(),
            }
        );

        let json = serde_json::to_vec_pretty(&meta).context(MetaParseSnafu {
            location: location.to_string(),
        })?;
        match storage::write_new(&location, &meta_path, &json).await {
            Ok(()) => {}
            Err(StorageError::AlreadyExists { .. }) => {
                return AlreadyExistsSnafu {
                    location: location.to_string(),
                }
                .fail();
            }
            Err(source) => {
                return Err(ArrayError::Storage {
                    operation: "write array metadata",
                    source,
                });
            }
        }

        debug!(
            "created {:?} array at {location} with {} columns, domain {}, tile capacity {}",
            meta.mode(),
            meta.schema().len(),
            meta.domain(),
            meta.tile_capacity()
        );

        let meta = Arc::new(meta);
        Ok(TileArray {
            store: TileStore::new(location.clone(), Arc::clone(&meta)),
            location,
            meta,
            extent: None,
            io: IoOptions::default(),
        })
    }

    /// Create a new array at `location`, deleting any array already there.
    pub async fn create_or_replace(
        location: ArrayLocation,
        meta: ArrayMeta,
    ) -> Result<Self, ArrayError> {
        meta.validate().context(InvalidSchemaSnafu)?;
        for dir in [layout::tiles_rel_dir(), layout::meta_rel_dir()] {
            storage::remove_dir_all(&location, &dir)
                .await
                .context(StorageSnafu {
                    operation: "remove existing array",
                })?;
        }
        debug!("removed existing array state at {location}");
        Self::create(location, meta).await
    }

    /// Open an existing array.
    ///
    /// Fails with [`ErrorKind::NotFound`] if there is no array metadata and
    /// with [`ErrorKind::SchemaCorrupt`] if it cannot be parsed or is
    /// inconsistent.
    pub async fn open(location: ArrayLocation) -> Result<Self, ArrayError> {
        let json = match storage::read_to_string(&location, &layout::array_meta_rel_path()).await {
            Ok(json) => json,
            Err(StorageError::NotFound { .. }) => {
                return NotFoundSnafu {
                    location: location.to_string(),
                }
                .fail();
            }
            Err(source) => {
                return Err(ArrayError::Storage {
                    operation: "read array metadata",
                    source,
                });
            }
        };

        let meta: ArrayMeta = serde_json::from_str(&json).context(MetaParseSnafu {
            location: location.to_string(),
        })?;
        meta.validate().context(MetaInvalidSnafu {
            location: location.to_string(),
        })?;

        let meta = Arc::new(meta);
        let store = TileStore::new(location.clone(), Arc::clone(&meta));
        let extent = load_extent(&store).await?;
        debug!("opened array at {location}, extent {extent:?}");

        Ok(TileArray {
            location,
            meta,
            store,
            extent,
            io: IoOptions::default(),
        })
    }

    /// Replace the I/O options of this handle.
    pub fn with_io_options(mut self, io: IoOptions) -> Self {
        self.io = io;
        self
    }

    /// I/O options in use.
    pub fn io_options(&self) -> IoOptions {
        self.io
    }

    /// Root location.
    pub fn location(&self) -> &ArrayLocation {
        &self.location
    }

    /// Persisted metadata.
    pub fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    /// Column schema.
    pub fn schema(&self) -> &Schema {
        self.meta.schema()
    }

    /// Layout mode.
    pub fn mode(&self) -> ArrayMode {
        self.meta.mode()
    }

    /// Row domain.
    pub fn domain(&self) -> Domain {
        self.meta.domain()
    }

    /// Smallest and largest populated rows seen by this handle.
    pub fn extent(&self) -> Option<Extent> {
        self.extent
    }

    /// `(rows, columns)`, where rows is the largest observed row index plus
    /// one (0 for an empty array).
    pub fn shape(&self) -> (u64, usize) {
        let rows = self.extent.map_or(0, |e| e.max + 1);
        (rows, self.meta.schema().len())
    }

    /// Re-read the observed extent from storage, picking up writes made
    /// through other handles.
    pub async fn refresh(&mut self) -> Result<(), ArrayError> {
        self.extent = load_extent(&self.store).await?;
        Ok(())
    }

    /// Number of populated rows across all tiles.
    ///
    /// Unlike [`TileArray::shape`], this counts gaps in sparse row indices
    /// and unwritten dense rows as absent.
    pub async fn row_count(&self) -> Result<u64, ArrayError> {
        let tiles = self.store.list_tiles().await?;
        let concurrency = self.io.resolve_tile_concurrency(tiles.len());
        let store = &self.store;
        let counts: Vec<u64> = stream::iter(tiles)
            .map(|index| async move {
                let reader = store.open_reader(index).await?;
                Ok::<_, TileError>(reader.map_or(0, |r| r.rows().len()))
            })
            .buffered(concurrency)
            .try_collect()
            .await?;
        Ok(counts.into_iter().sum())
    }

    pub(crate) fn store(&self) -> &TileStore {
        &self.store
    }

    pub(crate) fn observe(&mut self, extent: Extent) {
        self.extent = Some(Extent::merge(self.extent, extent));
    }
}

/// Derive the populated extent from the lowest and highest non-empty tiles.
async fn load_extent(store: &TileStore) -> Result<Option<Extent>, TileError> {
    let tiles = store.list_tiles().await?;

    let mut min = None;
    for &index in &tiles {
        match store.open_reader(index).await? {
            Some(reader) => {
                if let Some(offset) = reader.rows().min() {
                    min = Some(store.tile_start(index) + u64::from(offset));
                    break;
                }
            }
            None => warn!("tile directory {index} has no CURRENT pointer; ignoring it"),
        }
    }
    let Some(min) = min else {
        return Ok(None);
    };

    for &index in tiles.iter().rev() {
        if let Some(reader) = store.open_reader(index).await? {
            if let Some(offset) = reader.rows().max() {
                let max = store.tile_start(index) + u64::from(offset);
                return Ok(Some(Extent { min, max }));
            }
        }
    }
    Ok(Some(Extent::single(min)))
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use crate::batch::Batch;
    use crate::value::Value;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_then_open_round_trips_metadata() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());
        let created = TileArray::create(location.clone(), gene_meta(ArrayMode::Sparse)).await?;
        assert_eq!(created.shape(), (0, 3));

        let opened = TileArray::open(location).await?;
        assert_eq!(opened.meta(), created.meta());
        assert_eq!(opened.extent(), None);
        Ok(())
    }

    #[tokio::test]
    async fn create_twice_is_already_exists() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());
        TileArray::create(location.clone(), gene_meta(ArrayMode::Dense)).await?;

        let err = TileArray::create(location.clone(), gene_meta(ArrayMode::Dense))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let replaced = TileArray::create_or_replace(location, gene_meta(ArrayMode::Sparse)).await?;
        assert_eq!(replaced.mode(), ArrayMode::Sparse);
        Ok(())
    }

    #[tokio::test]
    async fn open_missing_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let err = TileArray::open(ArrayLocation::local(tmp.path().join("nope")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn open_garbage_metadata_is_schema_corrupt() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());
        storage::write_new(&location, &layout::array_meta_rel_path(), b"{not json").await?;

        let err = TileArray::open(location).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaCorrupt);
        Ok(())
    }

    #[tokio::test]
    async fn open_inconsistent_metadata_is_schema_corrupt() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());
        let mut json = serde_json::to_value(gene_meta(ArrayMode::Sparse))?;
        json["tile_capacity"] = serde_json::json!(0);
        storage::write_new(
            &location,
            &layout::array_meta_rel_path(),
            &serde_json::to_vec(&json)?,
        )
        .await?;

        let err = TileArray::open(location).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaCorrupt);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_picks_up_other_handles_writes() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());
        let mut writer = TileArray::create(location.clone(), gene_meta(ArrayMode::Sparse)).await?;
        let mut reader = TileArray::open(location).await?;

        let batch = Batch::builder()
            .row(3, [("name", Value::from("a"))])
            .row(10, [("name", Value::from("b"))])
            .build();
        writer.write_batch(&batch).await?;
        assert_eq!(writer.shape().0, 11);
        assert_eq!(reader.shape().0, 0);

        reader.refresh().await?;
        assert_eq!(reader.extent(), Some(Extent { min: 3, max: 10 }));
        assert_eq!(reader.row_count().await?, 2);
        Ok(())
    }
}
