//! Streaming reader for journal segment frames.

use crate::error::{CoreError, CoreResult};
use crate::journal::entry::{
    decode_frame, EntryRecord, JournalEntry, CRC_SIZE, ENTRY_MAGIC, HEADER_SIZE,
};
use prevaldb_storage::StorageBackend;

/// A streaming iterator over the entry frames of one journal segment.
///
/// Frames are read one at a time from the storage backend, so memory
/// use stays bounded by the largest single entry regardless of segment
/// size.
///
/// # Recovery Policy
///
/// A truncated trailing frame (incomplete header or payload) represents
/// a crash mid-write before flush; it is discarded and iteration ends
/// cleanly. Everything else that fails to parse (bad magic, future
/// version, unknown kind, CRC mismatch) is actual corruption and
/// surfaces as an error.
pub struct SegmentFrames {
    backend: Box<dyn StorageBackend>,
    offset: u64,
    size: u64,
    finished: bool,
}

impl SegmentFrames {
    /// Creates an iterator over all frames of the given backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let size = backend.size()?;
        Ok(Self {
            backend,
            offset: 0,
            size,
            finished: false,
        })
    }

    /// Offset of the first byte not yet consumed by a valid frame.
    ///
    /// After the iterator is exhausted, comparing this against the
    /// segment size reveals whether the segment ends in a truncated
    /// (tolerated) tail.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn read_next(&mut self) -> CoreResult<Option<JournalEntry<EntryRecord>>> {
        if self.finished || self.offset >= self.size {
            self.finished = true;
            return Ok(None);
        }

        let remaining = (self.size - self.offset) as usize;
        if remaining < HEADER_SIZE {
            // Truncated header: crash mid-write, clean end of segment.
            self.finished = true;
            return Ok(None);
        }

        let header = self.backend.read_at(self.offset, HEADER_SIZE)?;
        if header[0..4] != ENTRY_MAGIC {
            self.finished = true;
            return Err(CoreError::journal_corruption(format!(
                "invalid entry magic at offset {}",
                self.offset
            )));
        }

        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
        let frame_len = HEADER_SIZE + payload_len + CRC_SIZE;
        if remaining < frame_len {
            // Truncated payload: crash mid-write, clean end of segment.
            self.finished = true;
            return Ok(None);
        }

        let frame = self.backend.read_at(self.offset, frame_len)?;
        let entry = decode_frame(&frame).inspect_err(|_| {
            self.finished = true;
        })?;

        self.offset += frame_len as u64;
        Ok(Some(entry))
    }
}

impl Iterator for SegmentFrames {
    type Item = CoreResult<JournalEntry<EntryRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
