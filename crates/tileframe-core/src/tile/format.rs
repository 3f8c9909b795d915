//! Byte layout of a tile version file.
//!
//! ```text
//! +--------+-----------------+----------------------+---------------------+
//! | "TFT1" | header len (u32 | header (JSON,        | data area           |
//! |        | little endian)  | TileHeader)          |                     |
//! +--------+-----------------+----------------------+---------------------+
//! ```
//!
//! The data area holds the roaring row bitmap, then for each column an
//! optional roaring presence bitmap (sparse tiles only) followed by the
//! encoded values. [`Section`] offsets in the header are relative to the
//! start of the data area, so a reader can fetch the prefix, the header and
//! then exactly the sections it needs.
//!
//! Values are stored in ascending row-offset order. In dense tiles column
//! `i`'s `n`-th value belongs to the `n`-th populated row; in sparse tiles it
//! belongs to the `n`-th row of that column's presence bitmap.

use std::io::Cursor;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    codec,
    schema::{ARRAY_FORMAT_VERSION, ArrayMode, ColumnType, Schema},
    value::Value,
};

use super::{
    BitmapSnafu, CodecSnafu, CorruptSnafu, HeaderSnafu, Tile, TileColumn, TileError,
};

/// Magic bytes at the start of every tile file.
pub const TILE_MAGIC: [u8; 4] = *b"TFT1";

/// Length of the fixed prefix: magic plus header length.
pub const PREFIX_LEN: u64 = 8;

/// A byte range inside the data area.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    /// Offset from the start of the data area.
    pub offset: u64,
    /// Length in bytes.
    pub len: u64,
}

/// Where one column's bytes live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSection {
    /// Column name, checked against the schema on read.
    pub name: String,
    /// Column type, checked against the schema on read.
    pub column_type: ColumnType,
    /// Number of encoded values.
    pub value_count: u64,
    /// Presence bitmap; present for sparse tiles only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<Section>,
    /// Encoded values.
    pub values: Section,
}

/// JSON header of a tile file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TileHeader {
    /// Format version; matches the array format version.
    pub format_version: u32,
    /// Tile index.
    pub tile_index: u64,
    /// Rows per tile the file was written with.
    pub capacity: u64,
    /// Layout mode.
    pub mode: ArrayMode,
    /// Populated row count.
    pub row_count: u64,
    /// Populated row bitmap.
    pub rows: Section,
    /// One entry per schema column, in schema order.
    pub columns: Vec<ColumnSection>,
}

impl TileHeader {
    /// Check the header against the array it is read for.
    pub fn validate(
        &self,
        tile: u64,
        capacity: u64,
        mode: ArrayMode,
        schema: &Schema,
    ) -> Result<(), TileError> {
        ensure!(
            self.format_version == ARRAY_FORMAT_VERSION,
            CorruptSnafu {
                tile,
                msg: format!("unsupported tile format version {}", self.format_version),
            }
        );
        ensure!(
            self.tile_index == tile,
            CorruptSnafu {
                tile,
                msg: format!("header names tile {}", self.tile_index),
            }
        );
        ensure!(
            self.capacity == capacity && self.mode == mode,
            CorruptSnafu {
                tile,
                msg: format!(
                    "header has capacity {} / {} mode, array has {capacity} / {mode}",
                    self.capacity, self.mode
                ),
            }
        );
        ensure!(
            self.columns.len() == schema.len(),
            CorruptSnafu {
                tile,
                msg: format!(
                    "header has {} columns, schema has {}",
                    self.columns.len(),
                    schema.len()
                ),
            }
        );
        for (section, def) in self.columns.iter().zip(schema.columns()) {
            ensure!(
                section.name == def.name && section.column_type == def.column_type,
                CorruptSnafu {
                    tile,
                    msg: format!(
                        "column {}: {} does not match schema column {}",
                        section.name, section.column_type, def
                    ),
                }
            );
            ensure!(
                section.presence.is_some() == (mode == ArrayMode::Sparse),
                CorruptSnafu {
                    tile,
                    msg: format!("column {} presence bitmap does not match mode", section.name),
                }
            );
        }
        Ok(())
    }
}

fn bitmap_to_bytes(tile: u64, bitmap: &RoaringBitmap) -> Result<Vec<u8>, TileError> {
    let mut out = Vec::with_capacity(bitmap.serialized_size());
    {
        let mut w = Cursor::new(&mut out);
        bitmap.serialize_into(&mut w).context(BitmapSnafu { tile })?;
    }
    Ok(out)
}

/// Deserialize a roaring bitmap section.
pub(crate) fn bitmap_from_bytes(tile: u64, bytes: &[u8]) -> Result<RoaringBitmap, TileError> {
    RoaringBitmap::deserialize_from(Cursor::new(bytes)).context(BitmapSnafu { tile })
}

fn push_section(data: &mut Vec<u8>, bytes: &[u8]) -> Section {
    let section = Section {
        offset: data.len() as u64,
        len: bytes.len() as u64,
    };
    data.extend_from_slice(bytes);
    section
}

/// Encode a tile into the bytes of a version file.
pub fn encode_tile(tile: &Tile, schema: &Schema) -> Result<Vec<u8>, TileError> {
    let index = tile.index();
    let mut data = Vec::new();

    let rows_bytes = bitmap_to_bytes(index, tile.rows())?;
    let rows = push_section(&mut data, &rows_bytes);

    let mut columns = Vec::with_capacity(schema.len());
    for (def, column) in schema.columns().iter().zip(tile.columns()) {
        let presence = match tile.mode() {
            ArrayMode::Sparse => {
                let bitmap: RoaringBitmap = column.cells.keys().copied().collect();
                Some(push_section(&mut data, &bitmap_to_bytes(index, &bitmap)?))
            }
            ArrayMode::Dense => None,
        };

        let encoded = codec::encode_column(def.column_type, column.cells.values())
            .context(CodecSnafu {
                tile: index,
                column: def.name.clone(),
            })?;
        let values = push_section(&mut data, &encoded);

        columns.push(ColumnSection {
            name: def.name.clone(),
            column_type: def.column_type,
            value_count: column.cells.len() as u64,
            presence,
            values,
        });
    }

    let header = TileHeader {
        format_version: ARRAY_FORMAT_VERSION,
        tile_index: index,
        capacity: tile.capacity(),
        mode: tile.mode(),
        row_count: tile.row_count(),
        rows,
        columns,
    };
    let header_json = serde_json::to_vec(&header).context(HeaderSnafu { tile: index })?;
    let header_len = u32::try_from(header_json.len()).map_err(|_| {
        CorruptSnafu {
            tile: index,
            msg: format!("header of {} bytes is too large", header_json.len()),
        }
        .build()
    })?;

    let mut out = Vec::with_capacity(PREFIX_LEN as usize + header_json.len() + data.len());
    out.extend_from_slice(&TILE_MAGIC);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_json);
    out.extend_from_slice(&data);
    Ok(out)
}

/// Parse the fixed prefix and return the header length.
pub fn decode_prefix(tile: u64, prefix: &[u8]) -> Result<u32, TileError> {
    ensure!(
        prefix.len() >= PREFIX_LEN as usize,
        CorruptSnafu {
            tile,
            msg: format!("file is only {} bytes long", prefix.len()),
        }
    );
    ensure!(
        prefix[..4] == TILE_MAGIC,
        CorruptSnafu {
            tile,
            msg: "bad magic bytes".to_string(),
        }
    );
    let mut len = [0u8; 4];
    len.copy_from_slice(&prefix[4..8]);
    Ok(u32::from_le_bytes(len))
}

/// Parse the JSON header.
pub fn decode_header(tile: u64, bytes: &[u8]) -> Result<TileHeader, TileError> {
    serde_json::from_slice(bytes).context(HeaderSnafu { tile })
}

/// Borrow `section` out of the data area.
pub(crate) fn section_slice<'a>(
    tile: u64,
    data: &'a [u8],
    section: Section,
) -> Result<&'a [u8], TileError> {
    let start = usize::try_from(section.offset).ok();
    let end = section
        .offset
        .checked_add(section.len)
        .and_then(|e| usize::try_from(e).ok());
    match (start, end) {
        (Some(start), Some(end)) if end <= data.len() => Ok(&data[start..end]),
        _ => CorruptSnafu {
            tile,
            msg: format!(
                "section {}+{} exceeds data area of {} bytes",
                section.offset,
                section.len,
                data.len()
            ),
        }
        .fail(),
    }
}

/// Decode one column into values aligned with `rows`: entry `n` belongs to
/// the `n`-th populated row. Rows absent from a sparse column read as null.
pub(crate) fn decode_column_aligned(
    tile: u64,
    section: &ColumnSection,
    rows: &RoaringBitmap,
    presence: Option<&RoaringBitmap>,
    values_bytes: &[u8],
) -> Result<Vec<Value>, TileError> {
    let count = usize::try_from(section.value_count).map_err(|_| {
        CorruptSnafu {
            tile,
            msg: format!("value count {} overflows", section.value_count),
        }
        .build()
    })?;
    let values = codec::decode_column(section.column_type, values_bytes, count).context(
        CodecSnafu {
            tile,
            column: section.name.clone(),
        },
    )?;

    match presence {
        None => {
            ensure!(
                values.len() as u64 == rows.len(),
                CorruptSnafu {
                    tile,
                    msg: format!(
                        "dense column {} has {} values for {} rows",
                        section.name,
                        values.len(),
                        rows.len()
                    ),
                }
            );
            Ok(values)
        }
        Some(presence) => {
            ensure!(
                values.len() as u64 == presence.len() && presence.is_subset(rows),
                CorruptSnafu {
                    tile,
                    msg: format!("presence bitmap of column {} is inconsistent", section.name),
                }
            );
            let mut present = presence.iter().zip(values).peekable();
            let mut out = Vec::with_capacity(rows.len() as usize);
            for row in rows {
                match present.peek() {
                    Some((p, _)) if *p == row => {
                        if let Some((_, v)) = present.next() {
                            out.push(v);
                        }
                    }
                    _ => out.push(Value::Null),
                }
            }
            Ok(out)
        }
    }
}

/// Reject row bitmaps holding offsets past the end of the tile.
pub(crate) fn check_row_offsets(
    tile: u64,
    rows: &RoaringBitmap,
    capacity: u64,
) -> Result<(), TileError> {
    if let Some(max) = rows.max() {
        ensure!(
            u64::from(max) < capacity,
            CorruptSnafu {
                tile,
                msg: format!("row offset {max} outside tile capacity {capacity}"),
            }
        );
    }
    Ok(())
}

/// Decode a complete tile file.
pub fn decode_tile(
    bytes: &[u8],
    tile: u64,
    version: u64,
    capacity: u64,
    mode: ArrayMode,
    schema: &Schema,
) -> Result<Tile, TileError> {
    let header_len = decode_prefix(tile, bytes)? as usize;
    let data_start = PREFIX_LEN as usize + header_len;
    ensure!(
        bytes.len() >= data_start,
        CorruptSnafu {
            tile,
            msg: format!(
                "header claims {header_len} bytes, file has {}",
                bytes.len()
            ),
        }
    );
    let header = decode_header(tile, &bytes[PREFIX_LEN as usize..data_start])?;
    header.validate(tile, capacity, mode, schema)?;

    let data = &bytes[data_start..];
    let rows = bitmap_from_bytes(tile, section_slice(tile, data, header.rows)?)?;
    check_row_offsets(tile, &rows, capacity)?;

    let mut columns = Vec::with_capacity(header.columns.len());
    for section in &header.columns {
        let presence = match section.presence {
            Some(p) => Some(bitmap_from_bytes(tile, section_slice(tile, data, p)?)?),
            None => None,
        };
        let values_bytes = section_slice(tile, data, section.values)?;
        let aligned =
            decode_column_aligned(tile, section, &rows, presence.as_ref(), values_bytes)?;

        let mut cells = std::collections::BTreeMap::new();
        for (offset, value) in rows.iter().zip(aligned) {
            if presence.as_ref().is_none_or(|p| p.contains(offset)) {
                cells.insert(offset, value);
            }
        }
        columns.push(TileColumn { cells });
    }

    Ok(Tile::from_parts(tile, capacity, version, mode, rows, columns))
}
