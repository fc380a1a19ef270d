//! The document file and durable write helpers.

use crate::error::{StorageError, StorageResult};
use crate::naming::LOCK_SUFFIX;
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Handle on the single file that holds a fleetstore document.
///
/// `DataFile` does not keep the file open. Every operation resolves the path
/// again so that the rename-over-replace done by a save is always observed.
///
/// # Example
///
/// ```no_run
/// use fleetstore_storage::DataFile;
///
/// let file = DataFile::new("/var/lib/fleet/data.json");
/// if file.is_empty().unwrap() {
///     println!("fresh document");
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    path: PathBuf,
}

impl DataFile {
    /// Creates a handle for the given path. Nothing is touched on disk.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the directory holding the document.
    #[must_use]
    pub fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Returns `<file><suffix>`, the naming scheme of every sibling file.
    #[must_use]
    pub fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Returns true if the document exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Returns the size of the document in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the file is missing.
    pub fn size(&self) -> StorageResult<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                path: self.path.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns true if the document is missing or has no content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    pub fn is_empty(&self) -> StorageResult<bool> {
        match self.size() {
            Ok(size) => Ok(size == 0),
            Err(StorageError::NotFound { .. }) => Ok(true),
            Err(err) => Err(err),
        }
    }

    /// Creates the parent directory and an empty document if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or the file cannot be created.
    pub fn create_if_missing(&self) -> StorageResult<bool> {
        fs::create_dir_all(self.dir())?;
        if self.exists() {
            return Ok(false);
        }
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        Ok(true)
    }

    /// Reads the whole document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the file is missing.
    pub fn read_all(&self) -> StorageResult<Vec<u8>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    path: self.path.clone(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Copies the document to `dest`, returning the number of bytes copied.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the document is missing.
    pub fn copy_to(&self, dest: &Path) -> StorageResult<u64> {
        if !self.exists() {
            return Err(StorageError::NotFound {
                path: self.path.clone(),
            });
        }
        let copied = fs::copy(&self.path, dest)?;
        File::open(dest)?.sync_all()?;
        Ok(copied)
    }

    /// Atomically replaces the document with `source`.
    ///
    /// `source` must live in the same directory so the rename cannot cross
    /// file systems. The directory is synced afterwards so the rename itself
    /// survives a crash.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename or the directory sync fails.
    pub fn replace_with(&self, source: &Path) -> StorageResult<()> {
        fs::rename(source, &self.path)?;
        sync_directory(self.dir())
    }

    /// Takes the advisory exclusive lock on `<file>.lock`.
    ///
    /// The lock is held until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the lock.
    pub fn lock_exclusive(&self) -> StorageResult<FileLock> {
        fs::create_dir_all(self.dir())?;
        let path = self.sibling(LOCK_SUFFIX);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked { path });
        }

        Ok(FileLock { path, file })
    }
}

/// Guard for the advisory document lock.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    /// Returns the path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Writes `data` to `path`, truncating any previous content, and syncs it.
///
/// # Errors
///
/// Returns an error if the file cannot be created, written or synced.
pub fn write_durable(path: &Path, data: &[u8]) -> StorageResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

/// Removes `path`, returning whether a file was actually removed.
///
/// # Errors
///
/// Returns an error for any failure other than the file being absent.
pub fn remove_if_exists(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> StorageResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> StorageResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let file = DataFile::new(dir.path().join("data.json"));

        assert!(!file.exists());
        assert!(file.is_empty().unwrap());
        assert!(matches!(file.size(), Err(StorageError::NotFound { .. })));
        assert!(matches!(file.read_all(), Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn create_if_missing_creates_dirs() {
        let dir = tempdir().unwrap();
        let file = DataFile::new(dir.path().join("nested").join("data.json"));

        assert!(file.create_if_missing().unwrap());
        assert!(file.exists());
        assert!(file.is_empty().unwrap());
        assert!(!file.create_if_missing().unwrap());
    }

    #[test]
    fn write_and_read() {
        let dir = tempdir().unwrap();
        let file = DataFile::new(dir.path().join("data.json"));

        write_durable(file.path(), b"test content").unwrap();
        assert!(!file.is_empty().unwrap());
        assert_eq!(file.size().unwrap(), 12);
        assert_eq!(file.read_all().unwrap(), b"test content");

        write_durable(file.path(), b"{}").unwrap();
        assert_eq!(file.read_all().unwrap(), b"{}");
    }

    #[test]
    fn sibling_appends_suffix() {
        let file = DataFile::new("/tmp/fleet/data.json");
        assert_eq!(
            file.sibling(".save.bak.20240101120000"),
            PathBuf::from("/tmp/fleet/data.json.save.bak.20240101120000")
        );
        assert_eq!(file.dir(), Path::new("/tmp/fleet"));
    }

    #[test]
    fn bare_file_name_lives_in_current_dir() {
        let file = DataFile::new("data.json");
        assert_eq!(file.dir(), Path::new("."));
    }

    #[test]
    fn copy_and_replace() {
        let dir = tempdir().unwrap();
        let file = DataFile::new(dir.path().join("data.json"));
        write_durable(file.path(), b"old").unwrap();

        let backup = file.sibling(".bak");
        assert_eq!(file.copy_to(&backup).unwrap(), 3);

        let temp = file.sibling(".20240101120000.save");
        write_durable(&temp, b"new").unwrap();
        file.replace_with(&temp).unwrap();

        assert!(!temp.exists());
        assert_eq!(file.read_all().unwrap(), b"new");
        assert_eq!(fs::read(&backup).unwrap(), b"old");
    }

    #[test]
    fn copy_missing_fails() {
        let dir = tempdir().unwrap();
        let file = DataFile::new(dir.path().join("data.json"));
        let result = file.copy_to(&dir.path().join("copy"));
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn remove_if_exists_reports() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x");
        assert!(!remove_if_exists(&path).unwrap());
        write_durable(&path, b"x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let file = DataFile::new(dir.path().join("data.json"));

        let guard = file.lock_exclusive().unwrap();
        assert!(guard.path().ends_with("data.json.lock"));
        assert!(matches!(
            file.lock_exclusive(),
            Err(StorageError::Locked { .. })
        ));

        drop(guard);
        assert!(file.lock_exclusive().is_ok());
    }
}
