//! Engine directory management.
//!
//! File system layout of a persistent engine:
//!
//! ```text
//! <engine_path>/
//! ├─ LOCK          # Advisory lock for single-process ownership
//! ├─ journal/      # Numbered journal segments
//! └─ snapshots/    # Numbered snapshots
//! ```
//!
//! The LOCK file ensures only one process serves a given engine
//! directory at a time.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_DIR: &str = "journal";
const SNAPSHOTS_DIR: &str = "snapshots";

/// Holds the engine directory structure and its exclusive lock.
///
/// Only one `EngineDir` instance can exist per directory at a time;
/// the lock is released when the value is dropped.
#[derive(Debug)]
pub struct EngineDir {
    path: PathBuf,
    _lock_file: File,
}

impl EngineDir {
    /// Opens or creates an engine directory and acquires its lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineLocked`] if another process holds the
    /// lock, or an I/O error if the directory cannot be created.
    pub fn open(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::EngineLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the engine directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the journal segment directory.
    #[must_use]
    pub fn journal_dir(&self) -> PathBuf {
        self.path.join(JOURNAL_DIR)
    }

    /// Returns the snapshot directory.
    #[must_use]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.path.join(SNAPSHOTS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine");

        let engine_dir = EngineDir::open(&path).unwrap();
        assert!(path.exists());
        assert!(path.join(LOCK_FILE).exists());
        assert_eq!(engine_dir.journal_dir(), path.join("journal"));
        assert_eq!(engine_dir.snapshots_dir(), path.join("snapshots"));
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine");

        let _held = EngineDir::open(&path).unwrap();
        assert!(matches!(
            EngineDir::open(&path),
            Err(CoreError::EngineLocked)
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine");

        {
            let _held = EngineDir::open(&path).unwrap();
        }
        assert!(EngineDir::open(&path).is_ok());
    }

    #[test]
    fn open_rejects_file_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file");
        std::fs::write(&path, b"x").unwrap();

        assert!(matches!(
            EngineDir::open(&path),
            Err(CoreError::InvalidFormat { .. })
        ));
    }
}
