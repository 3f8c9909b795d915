//! Common imports for frame users.

pub use crate::{Frame, Selection};
pub use tileframe_core::{
    ArrayError, ArrayMeta, ArrayMode, Batch, ColumnDef, ColumnType, Domain, DuplicateRowPolicy,
    ErrorKind, IoOptions, Predicate, RowRange, Schema, Table, Value,
};
