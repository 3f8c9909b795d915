use std::{error::Error, fmt, io};

use snafu::{Backtrace, prelude::*};

/// Raw failure from the backend that serves tile and metadata files.
///
/// The local filesystem is the only backend; [`StorageError`] adds the path.
#[derive(Debug)]
pub enum BackendError {
    /// Filesystem error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Failure reading or writing an object under an array root.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// Nothing is stored at `path`.
    #[snafu(display("no object at {path}"))]
    NotFound {
        /// Missing object path.
        path: String,
        /// Backend error.
        source: BackendError,
        /// Captured backtrace.
        backtrace: Backtrace,
    },

    /// A create-new write found `path` taken.
    #[snafu(display("object already exists at {path}"))]
    AlreadyExists {
        /// Existing object path.
        path: String,
        /// Backend error.
        source: BackendError,
        /// Captured backtrace.
        backtrace: Backtrace,
    },

    /// A ranged read asked for bytes past the end of the file.
    #[snafu(display(
        "short read at {path}: wanted {len} bytes at offset {offset}, file has {file_len}"
    ))]
    ShortRead {
        /// File being read.
        path: String,
        /// Requested start offset.
        offset: u64,
        /// Requested length.
        len: u64,
        /// Actual file length.
        file_len: u64,
        /// Captured backtrace.
        backtrace: Backtrace,
    },

    /// The location uses a scheme other than a path or `file://`.
    #[snafu(display("unsupported array location: {spec}"))]
    UnsupportedLocation {
        /// Location as given.
        spec: String,
    },

    /// Any other filesystem failure.
    #[snafu(display("I/O error at {path}: {source}"))]
    OtherIo {
        /// Object path.
        path: String,
        /// Backend error.
        source: BackendError,
        /// Captured backtrace.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// True when the error means "nothing stored at this path".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
