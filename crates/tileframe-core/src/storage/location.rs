use std::{fmt, path::PathBuf};

use crate::storage::{StorageError, StorageResult};

/// Root location of a tile array.
///
/// Only the local filesystem is supported; the enum leaves room for object
/// storage backends without changing the tile store or array code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArrayLocation {
    /// An array stored on the local filesystem under the given directory.
    Local(PathBuf),
    // Future:
    // S3 { bucket: String, prefix: String },
}

impl ArrayLocation {
    /// Creates a new `ArrayLocation` for a local filesystem path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        ArrayLocation::Local(root.into())
    }

    /// Parse a user-facing location string.
    ///
    /// Accepts a plain filesystem path or a `file://` URI. Any other
    /// `scheme://` prefix is rejected with [`StorageError::UnsupportedLocation`].
    pub fn parse(spec: &str) -> StorageResult<Self> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(StorageError::UnsupportedLocation {
                spec: spec.to_string(),
            });
        }

        if let Some(path) = trimmed.strip_prefix("file://") {
            if path.is_empty() {
                return Err(StorageError::UnsupportedLocation {
                    spec: spec.to_string(),
                });
            }
            return Ok(ArrayLocation::local(path));
        }

        if trimmed.contains("://") {
            return Err(StorageError::UnsupportedLocation {
                spec: spec.to_string(),
            });
        }

        Ok(ArrayLocation::local(trimmed))
    }

    /// The root directory of a local location.
    pub fn root(&self) -> &PathBuf {
        match self {
            ArrayLocation::Local(root) => root,
        }
    }
}

impl fmt::Display for ArrayLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayLocation::Local(root) => write!(f, "{}", root.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_plain_paths_and_file_uris() {
        assert_eq!(
            ArrayLocation::parse("/tmp/genes").unwrap(),
            ArrayLocation::local("/tmp/genes")
        );
        assert_eq!(
            ArrayLocation::parse("file:///tmp/genes").unwrap(),
            ArrayLocation::local("/tmp/genes")
        );
    }

    #[test]
    fn parse_rejects_remote_schemes_and_empty_input() {
        assert!(matches!(
            ArrayLocation::parse("s3://bucket/genes"),
            Err(StorageError::UnsupportedLocation { .. })
        ));
        assert!(matches!(
            ArrayLocation::parse("   "),
            Err(StorageError::UnsupportedLocation { .. })
        ));
    }
}
