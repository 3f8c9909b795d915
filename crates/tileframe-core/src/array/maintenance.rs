//! Housekeeping for [`TileArray`].

use log::debug;

use super::{ArrayError, TileArray};

/// Outcome of [`TileArray::vacuum`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VacuumReport {
    /// Tile directories visited.
    pub tiles_scanned: u64,
    /// Superseded version files removed.
    pub removed_versions: u64,
    /// Leftover temp files removed.
    pub removed_temp_files: u64,
}

impl TileArray {
    /// Delete every tile version that is no longer live, plus temp files
    /// left by interrupted writes.
    ///
    /// A reader that resolved a tile's `CURRENT` pointer before the latest
    /// write may still be reading the superseded file. Run vacuum only when
    /// no such reader is in flight.
    pub async fn vacuum(&self) -> Result<VacuumReport, ArrayError> {
        let mut report = VacuumReport::default();
        for index in self.store().list_tiles().await? {
            let tile = self.store().vacuum_tile(index).await?;
            report.tiles_scanned += 1;
            report.removed_versions += tile.removed_versions;
            report.removed_temp_files += tile.removed_temp_files;
        }
        debug!(
            "vacuumed {} tiles at {}: {} versions, {} temp files removed",
            report.tiles_scanned,
            self.location(),
            report.removed_versions,
            report.removed_temp_files
        );
        Ok(report)
    }
}
