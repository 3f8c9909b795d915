//! Core engine for a columnar tile-array storage format.
//!
//! An array is a fixed set of typed columns over a single row dimension,
//! stored as fixed-capacity tiles on the local filesystem. This crate
//! provides:
//!
//! - Value codecs with reserved per-type null sentinels (`codec` module).
//! - Schema, domain and persisted array metadata (`schema` module).
//! - Versioned, atomically swapped tile files with ranged column reads
//!   (`tile` and `storage` modules).
//! - A predicate language with three-valued evaluation (`predicate` module).
//! - The [`TileArray`] handle tying these together: create/open, batch
//!   writes, range and predicate reads, vacuum (`array` module).
//!
//! The `tileframe` crate builds the user-facing frame API on top of this one.
#![deny(missing_docs)]
pub mod array;
pub mod batch;
pub mod codec;
pub mod options;
pub mod predicate;
pub mod schema;
pub mod storage;
pub mod table;
pub mod tile;
pub mod value;

pub use array::{
    ArrayError, ErrorKind, ReadRequest, TableScan, TileArray, VacuumReport, WriteReport,
};
pub use batch::{Batch, BatchError, BatchRow};
pub use options::IoOptions;
pub use predicate::{CompareOp, Predicate, PredicateError};
pub use schema::{
    ArrayMeta, ArrayMode, ColumnDef, ColumnType, Domain, DuplicateRowPolicy, Extent, RowRange,
    Schema, SchemaError,
};
pub use storage::ArrayLocation;
pub use table::Table;
pub use value::Value;
