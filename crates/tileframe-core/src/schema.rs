//! Schema, domain and array-level configuration.
//!
//! Everything in this module is fixed when an array is created and persisted
//! in the write-once `array.json` record ([`ArrayMeta`]):
//!
//! - the ordered column set ([`Schema`] of [`ColumnDef`]),
//! - the row dimension ([`Domain`]) and layout ([`ArrayMode`]),
//! - the tile capacity and the dense duplicate-row policy,
//! - the fill sentinels the codec used when the array was written.
//!
//! Domain growth in full-domain arrays needs no metadata update: the observed
//! row [`Extent`] is derived from the tiles themselves.

mod array_meta;
mod domain;

pub use array_meta::{
    ARRAY_FORMAT_VERSION, ArrayMeta, DEFAULT_TILE_CAPACITY, DuplicateRowPolicy, MAX_TILE_CAPACITY,
};
pub use domain::{ArrayMode, Domain, Extent, ResolvedRange, RowRange};

use std::{collections::HashSet, fmt};

use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Value type of a column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit IEEE float.
    Float64,
    /// UTF-8 string.
    Utf8,
    /// Boolean.
    Bool,
}

impl ColumnType {
    /// Encoded width in bytes, or `None` for variable-width types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ColumnType::Int64 | ColumnType::Float64 => Some(8),
            ColumnType::Bool => Some(1),
            ColumnType::Utf8 => None,
        }
    }

    /// The Arrow data type used when results are exported as a `RecordBatch`.
    pub fn to_arrow_datatype(self) -> DataType {
        match self {
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::Utf8,
            ColumnType::Bool => DataType::Boolean,
        }
    }

    /// The column type Arrow values of type `dt` import as, if any.
    ///
    /// Narrower integers and `Float32` widen; large and view strings map to
    /// `Utf8`. `UInt64` has no lossless counterpart and is rejected.
    pub fn from_arrow_datatype(dt: &DataType) -> Option<Self> {
        match dt {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32 => Some(ColumnType::Int64),
            DataType::Float32 | DataType::Float64 => Some(ColumnType::Float64),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Some(ColumnType::Utf8),
            DataType::Boolean => Some(ColumnType::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int64 => write!(f, "int64"),
            ColumnType::Float64 => write!(f, "float64"),
            ColumnType::Utf8 => write!(f, "utf8"),
            ColumnType::Bool => write!(f, "bool"),
        }
    }
}

/// Definition of one column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name, unique within the schema.
    pub name: String,
    /// Declared value type.
    pub column_type: ColumnType,
    /// Whether the column accepts nulls.
    pub nullable: bool,
}

impl ColumnDef {
    /// A nullable column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnDef {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    /// A column that rejects nulls.
    pub fn required(name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnDef {
            name: name.into(),
            column_type,
            nullable: false,
        }
    }

    /// Arrow field with the same name, type and nullability.
    pub fn to_arrow_field(&self) -> Field {
        Field::new(
            self.name.clone(),
            self.column_type.to_arrow_datatype(),
            self.nullable,
        )
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}?: {}", self.name, self.column_type)
        } else {
            write!(f, "{}: {}", self.name, self.column_type)
        }
    }
}

/// Errors raised while constructing or validating schema and array metadata.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// A schema must declare at least one column.
    #[snafu(display("Schema has no columns"))]
    EmptySchema,

    /// Column names must be non-empty.
    #[snafu(display("Column at position {position} has an empty name"))]
    EmptyColumnName {
        /// Zero-based position of the offending column.
        position: usize,
    },

    /// Duplicate column names are not allowed.
    #[snafu(display("Duplicate column name: {column}"))]
    DuplicateColumn {
        /// The duplicate column name.
        column: String,
    },

    /// Tile capacity must be in `1..=MAX_TILE_CAPACITY`.
    #[snafu(display("Invalid tile capacity {capacity} (expected 1..={max})"))]
    InvalidTileCapacity {
        /// The rejected capacity.
        capacity: u64,
        /// The largest accepted capacity.
        max: u64,
    },

    /// The metadata was written by an incompatible format version.
    #[snafu(display("Unsupported array format version {found} (this build reads {expected})"))]
    UnsupportedFormatVersion {
        /// Version found in the metadata.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// The persisted fill sentinels differ from the ones this build encodes.
    #[snafu(display("Fill sentinels in metadata do not match this build: {details}"))]
    FillMismatch {
        /// Which sentinel disagreed.
        details: String,
    },
}

/// Ordered set of column definitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

impl Schema {
    /// Construct a validated schema: non-empty, non-empty names, no duplicates.
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self, SchemaError> {
        let schema = Schema { columns };
        schema.validate()?;
        Ok(schema)
    }

    pub(crate) fn validate(&self) -> Result<(), SchemaError> {
        ensure!(!self.columns.is_empty(), EmptySchemaSnafu);

        let mut seen = HashSet::new();
        for (position, col) in self.columns.iter().enumerate() {
            ensure!(!col.name.is_empty(), EmptyColumnNameSnafu { position });
            if !seen.insert(col.name.as_str()) {
                return DuplicateColumnSnafu {
                    column: col.name.clone(),
                }
                .fail();
            }
        }
        Ok(())
    }

    /// Borrow the column definitions in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false for a validated schema.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of the column named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// The column named `name`.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Arrow schema with one field per column.
    pub fn to_arrow_schema(&self) -> ArrowSchema {
        ArrowSchema::new(
            self.columns
                .iter()
                .map(ColumnDef::to_arrow_field)
                .collect::<Vec<_>>(),
        )
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{col}")?;
        }
        f.write_str("}")
    }
}
