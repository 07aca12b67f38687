//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// An in-memory storage backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral engines that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use prevaldb_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let offset = backend.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(backend.size().unwrap(), 9);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for testing recovery scenarios such as truncated writes.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of all data in the backend.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let offset_usize = offset as usize;
        let end = offset_usize.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset_usize..end].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        // In-memory backend has no pending writes
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        // In-memory backend has no metadata to sync
        Ok(())
    }
}
