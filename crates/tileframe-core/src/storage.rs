//! Filesystem access and path utilities.
//!
//! This module centralizes all I/O performed by `tileframe-core`. Higher
//! layers (the tile store and the array handle) only ever talk to the helpers
//! here, passing an [`ArrayLocation`] and a path relative to it:
//!
//! - [`write_atomic`]: write-then-rename, used to swap `CURRENT` pointers.
//! - [`write_new`]: create-only-if-absent, used for immutable tile versions
//!   and the write-once array metadata record.
//! - [`read_all_bytes`], [`read_to_string`] and [`read_range`] for readers.
//! - Directory listing and removal for tile discovery and `vacuum`.
//!
//! Failures are surfaced as [`StorageError`] with the offending path; nothing
//! in this module retries.

mod error;
pub mod layout;
mod location;

pub use error::{BackendError, StorageError};
pub use location::ArrayLocation;

pub(crate) use error::{OtherIoSnafu, ShortReadSnafu};

use snafu::{Backtrace, prelude::*};
use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

/// Result of a storage helper.
pub type StorageResult<T> = Result<T, StorageError>;

/// Join an array location with a relative path into an absolute local path.
fn join_local(location: &ArrayLocation, rel: &Path) -> PathBuf {
    match location {
        ArrayLocation::Local(root) => root.join(rel),
    }
}

fn classify(abs: &Path, e: io::Error) -> StorageError {
    let path = abs.display().to_string();
    match e.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound {
            path,
            source: BackendError::Local(e),
            backtrace: Backtrace::capture(),
        },
        io::ErrorKind::AlreadyExists => StorageError::AlreadyExists {
            path,
            source: BackendError::Local(e),
            backtrace: Backtrace::capture(),
        },
        _ => StorageError::OtherIo {
            path,
            source: BackendError::Local(e),
            backtrace: Backtrace::capture(),
        },
    }
}

async fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: parent.display().to_string(),
            })?;
    }
    Ok(())
}

/// Deletes the `.tmp` sibling of an atomic write if the rename never happens.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Keep the file; the rename consumed it.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Replace `rel_path` under `location` with `contents` in one rename.
///
/// Writes the payload to `<target>.tmp`, syncs it, then renames it over the
/// target. Readers observe either the previous file or the new one, never a
/// partially written file.
pub async fn write_atomic(
    location: &ArrayLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    match location {
        ArrayLocation::Local(_) => {
            let abs = join_local(location, rel_path);
            create_parent_dir(&abs).await?;

            let tmp_path = abs.with_extension("tmp");
            let mut guard = TempFileGuard::new(tmp_path.clone());

            {
                let mut file = fs::File::create(&tmp_path)
                    .await
                    .map_err(BackendError::Local)
                    .context(OtherIoSnafu {
                        path: tmp_path.display().to_string(),
                    })?;

                file.write_all(contents)
                    .await
                    .map_err(BackendError::Local)
                    .context(OtherIoSnafu {
                        path: tmp_path.display().to_string(),
                    })?;

                file.sync_all()
                    .await
                    .map_err(BackendError::Local)
                    .context(OtherIoSnafu {
                        path: tmp_path.display().to_string(),
                    })?;
            }

            fs::rename(&tmp_path, &abs)
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: abs.display().to_string(),
                })?;

            guard.disarm();
            Ok(())
        }
    }
}

/// Create a *new* file at `rel_path` and write `contents`, failing with
/// [`StorageError::AlreadyExists`] if the file already exists.
///
/// Used for tile version files and the array metadata record, both of which
/// are immutable once written.
pub async fn write_new(
    location: &ArrayLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    match location {
        ArrayLocation::Local(_) => {
            let abs = join_local(location, rel_path);
            create_parent_dir(&abs).await?;

            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&abs)
                .await
                .map_err(|e| classify(&abs, e))?;

            // A half-written immutable file must not survive a failed write.
            let mut guard = TempFileGuard::new(abs.clone());

            file.write_all(contents)
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: abs.display().to_string(),
                })?;

            file.sync_all()
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: abs.display().to_string(),
                })?;

            guard.disarm();
            Ok(())
        }
    }
}

/// Read the file at `rel_path` and return its contents as a `String`.
///
/// A missing file yields [`StorageError::NotFound`].
pub async fn read_to_string(location: &ArrayLocation, rel_path: &Path) -> StorageResult<String> {
    match location {
        ArrayLocation::Local(_) => {
            let abs = join_local(location, rel_path);
            fs::read_to_string(&abs)
                .await
                .map_err(|e| classify(&abs, e))
        }
    }
}

/// Read the full contents of the file at `rel_path`.
///
/// A missing file yields [`StorageError::NotFound`].
pub async fn read_all_bytes(location: &ArrayLocation, rel_path: &Path) -> StorageResult<Vec<u8>> {
    match location {
        ArrayLocation::Local(_) => {
            let abs = join_local(location, rel_path);
            fs::read(&abs).await.map_err(|e| classify(&abs, e))
        }
    }
}

/// Read exactly `len` bytes starting at `offset` from the file at `rel_path`.
///
/// Semantics:
/// - On missing file: [`StorageError::NotFound`].
/// - If the file ends before `offset + len`: [`StorageError::ShortRead`].
/// - On other I/O problems: [`StorageError::OtherIo`].
pub async fn read_range(
    location: &ArrayLocation,
    rel_path: &Path,
    offset: u64,
    len: u64,
) -> StorageResult<Vec<u8>> {
    match location {
        ArrayLocation::Local(_) => {
            let abs = join_local(location, rel_path);
            let path_str = abs.display().to_string();

            let mut file = fs::File::open(&abs)
                .await
                .map_err(|e| classify(&abs, e))?;

            let file_len = file
                .metadata()
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: path_str.clone(),
                })?
                .len();

            let end = offset.checked_add(len);
            if end.is_none_or(|end| end > file_len) {
                return ShortReadSnafu {
                    path: path_str,
                    offset,
                    len,
                    file_len,
                }
                .fail();
            }

            let buf_len = usize::try_from(len)
                .map_err(|e| BackendError::Local(io::Error::other(e)))
                .context(OtherIoSnafu {
                    path: path_str.clone(),
                })?;
            let mut buf = vec![0u8; buf_len];

            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: path_str.clone(),
                })?;
            file.read_exact(&mut buf)
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu { path: path_str })?;

            Ok(buf)
        }
    }
}

/// Whether anything exists at `rel_path`.
pub async fn exists(location: &ArrayLocation, rel_path: &Path) -> StorageResult<bool> {
    match location {
        ArrayLocation::Local(_) => {
            let abs = join_local(location, rel_path);
            fs::try_exists(&abs)
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: abs.display().to_string(),
                })
        }
    }
}

/// List the entry names directly under the directory at `rel_path`.
///
/// A missing directory lists as empty. Names that are not valid UTF-8 are
/// skipped. The result is sorted.
pub async fn list_dir(location: &ArrayLocation, rel_path: &Path) -> StorageResult<Vec<String>> {
    match location {
        ArrayLocation::Local(_) => {
            let abs = join_local(location, rel_path);
            let mut entries = match fs::read_dir(&abs).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(classify(&abs, e)),
            };

            let mut names = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: abs.display().to_string(),
                })?
            {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
            names.sort_unstable();
            Ok(names)
        }
    }
}

/// Remove the file at `rel_path`. A missing file is not an error.
pub async fn remove_file(location: &ArrayLocation, rel_path: &Path) -> StorageResult<()> {
    match location {
        ArrayLocation::Local(_) => {
            let abs = join_local(location, rel_path);
            match fs::remove_file(&abs).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(classify(&abs, e)),
            }
        }
    }
}

/// Recursively remove the directory at `rel_path`. A missing directory is
/// not an error.
pub async fn remove_dir_all(location: &ArrayLocation, rel_path: &Path) -> StorageResult<()> {
    match location {
        ArrayLocation::Local(_) => {
            let abs = join_local(location, rel_path);
            match fs::remove_dir_all(&abs).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(classify(&abs, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn write_atomic_creates_parent_directories() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());

        let rel_path = Path::new("_tiles/00000000000000000000/CURRENT");
        write_atomic(&location, rel_path, b"1\n").await?;

        let abs = tmp.path().join(rel_path);
        assert_eq!(tokio::fs::read_to_string(&abs).await?, "1\n");
        Ok(())
    }

    #[tokio::test]
    async fn write_atomic_overwrites_and_leaves_no_tmp_file() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());
        let rel_path = Path::new("CURRENT");

        write_atomic(&location, rel_path, b"1\n").await?;
        write_atomic(&location, rel_path, b"2\n").await?;

        assert_eq!(read_to_string(&location, rel_path).await?, "2\n");
        assert!(!tmp.path().join("CURRENT.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn read_to_string_returns_not_found_for_missing_file() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());

        let err = read_to_string(&location, Path::new("missing.json"))
            .await
            .expect_err("expected NotFound error");
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn write_new_fails_if_file_exists() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());
        let rel_path = Path::new("nested/0000000001.tile");

        write_new(&location, rel_path, b"first").await?;
        let err = write_new(&location, rel_path, b"second")
            .await
            .expect_err("expected AlreadyExists error");
        assert!(matches!(err, StorageError::AlreadyExists { .. }));

        assert_eq!(read_all_bytes(&location, rel_path).await?, b"first");
        Ok(())
    }

    #[tokio::test]
    async fn read_range_returns_requested_slice() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());
        let rel_path = Path::new("data.bin");
        write_new(&location, rel_path, b"0123456789").await?;

        assert_eq!(read_range(&location, rel_path, 2, 3).await?, b"234");
        assert_eq!(read_range(&location, rel_path, 10, 0).await?, b"");
        Ok(())
    }

    #[tokio::test]
    async fn read_range_past_end_is_short_read() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());
        let rel_path = Path::new("data.bin");
        write_new(&location, rel_path, b"0123").await?;

        let err = read_range(&location, rel_path, 2, 8)
            .await
            .expect_err("expected short read");
        assert!(matches!(
            err,
            StorageError::ShortRead {
                file_len: 4,
                ..
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn list_dir_is_sorted_and_tolerates_missing_dir() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());

        assert!(list_dir(&location, Path::new("nope")).await?.is_empty());

        write_new(&location, Path::new("d/b"), b"").await?;
        write_new(&location, Path::new("d/a"), b"").await?;
        assert_eq!(list_dir(&location, Path::new("d")).await?, vec!["a", "b"]);
        Ok(())
    }

    #[tokio::test]
    async fn remove_helpers_ignore_missing_paths() -> TestResult {
        let tmp = TempDir::new()?;
        let location = ArrayLocation::local(tmp.path());

        remove_file(&location, Path::new("ghost")).await?;
        remove_dir_all(&location, Path::new("ghost_dir")).await?;

        write_new(&location, Path::new("d/x"), b"x").await?;
        remove_dir_all(&location, Path::new("d")).await?;
        assert!(!exists(&location, Path::new("d")).await?);
        Ok(())
    }
}
