//! Error types and SNAFU context selectors for [`TileArray`](super::TileArray).
//!
//! `ArrayError` is the error every public array operation returns. Callers
//! that need to branch on the failure class use [`ArrayError::kind`], which
//! collapses the variants into the stable [`ErrorKind`] taxonomy.

use std::fmt;

use snafu::prelude::*;

use crate::{
    batch::BatchError,
    codec::CodecError,
    predicate::PredicateError,
    schema::SchemaError,
    storage::StorageError,
    tile::TileError,
};

/// Stable classification of array errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The location already holds an array.
    AlreadyExists,
    /// No array at the location.
    NotFound,
    /// Array metadata is unreadable or inconsistent.
    SchemaCorrupt,
    /// A batch or schema does not conform.
    Validation,
    /// A row index is outside the domain, or a dense row is incomplete or
    /// already written.
    DomainViolation,
    /// A value or literal has the wrong type for its column.
    TypeMismatch,
    /// Persisted tile data is damaged.
    CorruptData,
    /// A projection or predicate names an undeclared column.
    ColumnNotFound,
    /// Predicate text is malformed.
    PredicateSyntax,
    /// The storage layer failed.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::NotFound => "not found",
            ErrorKind::SchemaCorrupt => "schema corrupt",
            ErrorKind::Validation => "validation",
            ErrorKind::DomainViolation => "domain violation",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::CorruptData => "corrupt data",
            ErrorKind::ColumnNotFound => "column not found",
            ErrorKind::PredicateSyntax => "predicate syntax",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// Errors from array handle operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ArrayError {
    /// `create` found an existing array.
    #[snafu(display("An array already exists at {location}"))]
    AlreadyExists {
        /// Array root.
        location: String,
    },

    /// `open` found no array metadata.
    #[snafu(display("No array found at {location}"))]
    NotFound {
        /// Array root.
        location: String,
    },

    /// The metadata file is not valid JSON for an array.
    #[snafu(display("Array metadata at {location} is unreadable: {source}"))]
    MetaParse {
        /// Array root.
        location: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The metadata parsed but is internally inconsistent.
    #[snafu(display("Array metadata at {location} is inconsistent: {source}"))]
    MetaInvalid {
        /// Array root.
        location: String,
        /// What is inconsistent.
        source: SchemaError,
    },

    /// The metadata passed to `create` is invalid.
    #[snafu(display("Invalid array definition: {source}"))]
    InvalidSchema {
        /// What is invalid.
        source: SchemaError,
    },

    /// The batch names a column the schema does not declare.
    #[snafu(display("Row {row} writes undeclared column {column}"))]
    UnknownColumn {
        /// Row index.
        row: u64,
        /// Column name.
        column: String,
    },

    /// The same row index appears twice in one batch.
    #[snafu(display("Row {row} appears more than once in the batch"))]
    DuplicateBatchRow {
        /// Row index.
        row: u64,
    },

    /// Null written to a non-nullable column.
    #[snafu(display("Row {row} writes null to non-nullable column {column}"))]
    NullInRequiredColumn {
        /// Row index.
        row: u64,
        /// Column name.
        column: String,
    },

    /// A cell value does not fit its column.
    #[snafu(display("Row {row}, column {column}: {source}"))]
    InvalidValue {
        /// Row index.
        row: u64,
        /// Column name.
        column: String,
        /// Type or sentinel check failure.
        source: CodecError,
    },

    /// A row index, or a dense row's column set, violates the domain.
    #[snafu(display("Domain violation at row {row}: {msg}"))]
    DomainViolation {
        /// Row index.
        row: u64,
        /// Description of the problem.
        msg: String,
    },

    /// A projection names an undeclared column.
    #[snafu(display("Column not found: {column}"))]
    ColumnNotFound {
        /// Column name, or `#<position>` for positional selection.
        column: String,
    },

    /// The predicate could not be parsed or bound.
    #[snafu(display("Invalid predicate: {source}"))]
    Predicate {
        /// Underlying predicate error.
        source: PredicateError,
    },

    /// An Arrow batch could not be converted for writing.
    #[snafu(display("Invalid batch: {source}"))]
    Batch {
        /// Underlying batch conversion error.
        source: BatchError,
    },

    /// Storage failed outside of tile operations.
    #[snafu(display("Storage error during {operation}: {source}"))]
    Storage {
        /// What the array was doing.
        operation: &'static str,
        /// Underlying storage error.
        source: StorageError,
    },

    /// A tile operation failed.
    #[snafu(display("{source}"))]
    Tile {
        /// Underlying tile error.
        source: TileError,
    },
}

impl ArrayError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArrayError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            ArrayError::NotFound { .. } => ErrorKind::NotFound,
            ArrayError::MetaParse { .. } | ArrayError::MetaInvalid { .. } => {
                ErrorKind::SchemaCorrupt
            }
            ArrayError::InvalidSchema { .. }
            | ArrayError::UnknownColumn { .. }
            | ArrayError::DuplicateBatchRow { .. }
            | ArrayError::NullInRequiredColumn { .. }
            | ArrayError::Batch { .. } => ErrorKind::Validation,
            ArrayError::InvalidValue { source, .. } => match source {
                CodecError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
                _ => ErrorKind::Validation,
            },
            ArrayError::DomainViolation { .. } => ErrorKind::DomainViolation,
            ArrayError::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            ArrayError::Predicate { source } => match source {
                PredicateError::Syntax { .. } => ErrorKind::PredicateSyntax,
                PredicateError::UnknownColumn { .. } => ErrorKind::ColumnNotFound,
                PredicateError::IncompatibleLiteral { .. } => ErrorKind::TypeMismatch,
            },
            ArrayError::Storage { source, .. } => match source {
                StorageError::NotFound { .. } => ErrorKind::NotFound,
                StorageError::ShortRead { .. } => ErrorKind::CorruptData,
                _ => ErrorKind::Io,
            },
            ArrayError::Tile { source } => {
                if source.is_corrupt() {
                    ErrorKind::CorruptData
                } else {
                    ErrorKind::Io
                }
            }
        }
    }
}

impl From<TileError> for ArrayError {
    fn from(source: TileError) -> Self {
        ArrayError::Tile { source }
    }
}

impl From<PredicateError> for ArrayError {
    fn from(source: PredicateError) -> Self {
        ArrayError::Predicate { source }
    }
}

impl From<BatchError> for ArrayError {
    fn from(source: BatchError) -> Self {
        ArrayError::Batch { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_errors_map_to_distinct_kinds() {
        let syntax: ArrayError = PredicateError::syntax(3, "bad").into();
        assert_eq!(syntax.kind(), ErrorKind::PredicateSyntax);

        let unknown: ArrayError = PredicateError::UnknownColumn {
            column: "x".to_string(),
        }
        .into();
        assert_eq!(unknown.kind(), ErrorKind::ColumnNotFound);
    }

    #[test]
    fn codec_type_mismatch_is_its_own_kind() {
        let err = ArrayError::InvalidValue {
            row: 0,
            column: "n".to_string(),
            source: CodecError::TypeMismatch {
                expected: crate::schema::ColumnType::Int64,
                found: "utf8",
            },
        };
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(err.kind().to_string(), "type mismatch");
    }
}
