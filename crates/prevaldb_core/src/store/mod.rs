//! Pluggable persistence for journal entries.
//!
//! A [`CommandStore`] persists encoded entry frames, optionally split
//! into size/count-bounded segments. Stores are oblivious to rollback
//! semantics and id assignment; those belong to the journal. What a
//! store does own is segment bookkeeping: frames are grouped into
//! segments sealed according to a [`RolloverStrategy`], and segment
//! identifiers encode both a monotonically increasing sequence number
//! and the id of the first contained entry, so a reader can skip
//! directly to the segment containing a requested starting id.

mod file;
mod memory;

pub use file::FileCommandStore;
pub use memory::InMemoryCommandStore;

use crate::error::CoreResult;
use crate::journal::{EntryRecord, JournalEntry};
use crate::types::EntryId;

/// Decides when the active segment is sealed and a new one started.
///
/// Strategies compose: `Any` rolls over when any member would, which
/// expresses "bytes ≥ B **or** entries ≥ N". Rollover is evaluated
/// before an append and never seals an empty segment.
#[derive(Debug, Clone)]
pub enum RolloverStrategy {
    /// Never roll over; a single segment grows forever.
    Never,
    /// Roll over once the active segment holds at least this many bytes.
    MaxBytes(u64),
    /// Roll over once the active segment holds at least this many entries.
    MaxEntries(u64),
    /// Roll over when any of the composed strategies would.
    Any(Vec<RolloverStrategy>),
}

impl RolloverStrategy {
    /// Returns whether a segment with the given content should be
    /// sealed before the next append.
    #[must_use]
    pub fn should_rollover(&self, bytes_in_segment: u64, entries_in_segment: u64) -> bool {
        match self {
            Self::Never => false,
            Self::MaxBytes(max) => bytes_in_segment >= *max,
            Self::MaxEntries(max) => entries_in_segment >= *max,
            Self::Any(strategies) => strategies
                .iter()
                .any(|s| s.should_rollover(bytes_in_segment, entries_in_segment)),
        }
    }
}

impl Default for RolloverStrategy {
    fn default() -> Self {
        Self::MaxBytes(64 * 1024 * 1024)
    }
}

/// Persists journal entry frames.
///
/// Implementations must preserve append order and must not reorder,
/// rewrite, or drop frames. The `id` passed to `append_entry` is used
/// only for segment naming and skip-ahead reads; stores never assign
/// ids and never write entries of their own.
pub trait CommandStore: Send + Sync {
    /// Appends an encoded entry frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be persisted. After an
    /// error the store's durable contents are unspecified beyond "a
    /// prefix of what was appended"; the engine treats this as fatal.
    fn append_entry(&self, id: EntryId, frame: &[u8]) -> CoreResult<()>;

    /// Iterates decoded entries in append order, starting at the newest
    /// segment whose first entry id is ≤ `from_id`.
    ///
    /// Entries with smaller ids may precede the requested id; filtering
    /// to an exact range is the journal's job.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment listing cannot be read.
    fn read_entries(
        &self,
        from_id: EntryId,
    ) -> CoreResult<Box<dyn Iterator<Item = CoreResult<JournalEntry<EntryRecord>>> + Send>>;

    /// Flushes buffered frames to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> CoreResult<()>;

    /// Returns the number of segments, including the active one.
    fn segment_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_does_not_roll() {
        assert!(!RolloverStrategy::Never.should_rollover(u64::MAX, u64::MAX));
    }

    #[test]
    fn max_bytes_threshold() {
        let strategy = RolloverStrategy::MaxBytes(100);
        assert!(!strategy.should_rollover(99, 1000));
        assert!(strategy.should_rollover(100, 0));
    }

    #[test]
    fn max_entries_threshold() {
        let strategy = RolloverStrategy::MaxEntries(5);
        assert!(!strategy.should_rollover(u64::MAX - 1, 4));
        assert!(strategy.should_rollover(0, 5));
    }

    #[test]
    fn any_composes_with_or() {
        let strategy = RolloverStrategy::Any(vec![
            RolloverStrategy::MaxBytes(100),
            RolloverStrategy::MaxEntries(5),
        ]);
        assert!(!strategy.should_rollover(50, 3));
        assert!(strategy.should_rollover(100, 3));
        assert!(strategy.should_rollover(50, 5));
    }
}
