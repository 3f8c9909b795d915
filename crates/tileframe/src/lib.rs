//! Dataframe-style access to columnar tile arrays.
//!
//! A [`Frame`] wraps one `tileframe-core` array and offers row-range
//! slicing, column projection, predicate queries and batch appends, all
//! returning an ordered-row [`Table`] keyed by row index.
//!
//! ```no_run
//! use tileframe::prelude::*;
//!
//! # async fn demo() -> Result<(), ArrayError> {
//! let schema = Schema::new(vec![
//!     ColumnDef::new("name", ColumnType::Utf8),
//!     ColumnDef::new("expression", ColumnType::Float64),
//! ])
//! .map_err(|source| ArrayError::InvalidSchema { source })?;
//! let mut frame = Frame::create("genes", schema, Domain::full(), ArrayMode::Sparse).await?;
//!
//! let batch = Batch::builder()
//!     .row(0, [("name", Value::from("GeneA")), ("expression", Value::from(12.5))])
//!     .build();
//! frame.write_batch(&batch).await?;
//!
//! let high = frame.query("expression > 5.0").await?;
//! assert_eq!(high.row_indices(), &[0]);
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]
pub mod frame;
pub mod prelude;
pub mod select;

pub use frame::Frame;
pub use select::Selection;
pub use tileframe_core::{
    ArrayError, ArrayMeta, ArrayMode, Batch, ColumnDef, ColumnType, Domain, DuplicateRowPolicy,
    ErrorKind, RowRange, Schema, Table, Value,
};
