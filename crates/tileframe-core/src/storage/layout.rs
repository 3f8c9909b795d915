//! On-disk layout helpers for an array root.
//!
//! This module centralizes all *relative* path conventions under an array root:
//! - the metadata directory holding the write-once `array.json` record
//! - one directory per tile holding immutable version files and a `CURRENT`
//!   pointer naming the live version
//!
//! ```text
//! array_root/
//!   _tileframe/
//!     array.json
//!   _tiles/
//!     00000000000000000000/
//!       CURRENT                 # live version (e.g. "2\n")
//!       0000000001.tile
//!       0000000002.tile
//!     00000000000000000001/
//!       ...
//! ```
//!
//! The functions here return relative [`PathBuf`] values. Callers join these
//! with an [`crate::storage::ArrayLocation`] before doing IO.

use std::path::PathBuf;

/// Name of the directory holding array-level metadata.
pub const META_DIR_NAME: &str = "_tileframe";

/// File name of the persisted [`crate::schema::ArrayMeta`] record.
pub const ARRAY_META_FILE_NAME: &str = "array.json";

/// Name of the directory holding one subdirectory per tile.
pub const TILES_DIR_NAME: &str = "_tiles";

/// Name of the per-tile file that stores the live version pointer.
pub const CURRENT_FILE_NAME: &str = "CURRENT";

/// Extension of tile version files.
pub const TILE_FILE_EXT: &str = "tile";

/// Number of digits used in zero-padded tile directory names (fits `u64::MAX`).
pub const TILE_DIR_DIGITS: usize = 20;

/// Number of digits used in zero-padded tile version file names.
pub const VERSION_FILENAME_DIGITS: usize = 10;

/// Relative path: `_tileframe/`
pub fn meta_rel_dir() -> PathBuf {
    PathBuf::from(META_DIR_NAME)
}

/// Relative path: `_tileframe/array.json`
pub fn array_meta_rel_path() -> PathBuf {
    meta_rel_dir().join(ARRAY_META_FILE_NAME)
}

/// Relative path: `_tiles/`
pub fn tiles_rel_dir() -> PathBuf {
    PathBuf::from(TILES_DIR_NAME)
}

/// Relative path: `_tiles/<zero-padded tile index>/`
pub fn tile_rel_dir(tile_index: u64) -> PathBuf {
    tiles_rel_dir().join(format!("{:0width$}", tile_index, width = TILE_DIR_DIGITS))
}

/// Relative path: `_tiles/<tile>/CURRENT`
pub fn tile_current_rel_path(tile_index: u64) -> PathBuf {
    tile_rel_dir(tile_index).join(CURRENT_FILE_NAME)
}

/// Relative path: `_tiles/<tile>/<zero-padded version>.tile`
pub fn tile_version_rel_path(tile_index: u64, version: u64) -> PathBuf {
    let file_name = format!(
        "{:0width$}.{TILE_FILE_EXT}",
        version,
        width = VERSION_FILENAME_DIGITS
    );
    tile_rel_dir(tile_index).join(file_name)
}

/// Parse a tile directory name back into its tile index.
///
/// Returns `None` for anything that is not exactly a zero-padded index.
pub fn parse_tile_dir_name(name: &str) -> Option<u64> {
    if name.len() != TILE_DIR_DIGITS || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Parse a tile version file name (`0000000003.tile`) into its version.
pub fn parse_tile_version_file_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(TILE_FILE_EXT)?.strip_suffix('.')?;
    if stem.len() != VERSION_FILENAME_DIGITS || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
