//! In-memory command store for testing.

use crate::error::CoreResult;
use crate::journal::{decode_frame, EntryRecord, JournalEntry};
use crate::store::{CommandStore, RolloverStrategy};
use crate::types::EntryId;
use parking_lot::RwLock;

struct MemorySegment {
    seq: u64,
    first_id: EntryId,
    frames: Vec<Vec<u8>>,
    bytes: u64,
}

/// A segmented in-memory command store.
///
/// Applies the same rollover semantics as the file store so segment
/// behavior can be exercised without touching disk.
pub struct InMemoryCommandStore {
    rollover: RolloverStrategy,
    segments: RwLock<Vec<MemorySegment>>,
}

impl InMemoryCommandStore {
    /// Creates an empty store with the given rollover strategy.
    #[must_use]
    pub fn new(rollover: RolloverStrategy) -> Self {
        Self {
            rollover,
            segments: RwLock::new(Vec::new()),
        }
    }

    /// Returns the first entry id of every segment, in order.
    ///
    /// Useful for asserting rollover behavior in tests.
    #[must_use]
    pub fn segment_first_ids(&self) -> Vec<EntryId> {
        self.segments.read().iter().map(|s| s.first_id).collect()
    }
}

impl CommandStore for InMemoryCommandStore {
    fn append_entry(&self, id: EntryId, frame: &[u8]) -> CoreResult<()> {
        let mut segments = self.segments.write();

        let needs_new = match segments.last() {
            None => true,
            Some(active) => {
                !active.frames.is_empty()
                    && self
                        .rollover
                        .should_rollover(active.bytes, active.frames.len() as u64)
            }
        };

        if needs_new {
            let seq = segments.last().map_or(1, |s| s.seq + 1);
            segments.push(MemorySegment {
                seq,
                first_id: id,
                frames: Vec::new(),
                bytes: 0,
            });
        }

        // A segment always exists here.
        if let Some(active) = segments.last_mut() {
            active.bytes += frame.len() as u64;
            active.frames.push(frame.to_vec());
        }
        Ok(())
    }

    fn read_entries(
        &self,
        from_id: EntryId,
    ) -> CoreResult<Box<dyn Iterator<Item = CoreResult<JournalEntry<EntryRecord>>> + Send>> {
        let segments = self.segments.read();
        let start = segments
            .iter()
            .rposition(|s| s.first_id <= from_id)
            .unwrap_or(0);

        let frames: Vec<Vec<u8>> = segments[start..]
            .iter()
            .flat_map(|s| s.frames.iter().cloned())
            .collect();

        Ok(Box::new(frames.into_iter().map(|f| decode_frame(&f))))
    }

    fn flush(&self) -> CoreResult<()> {
        Ok(())
    }

    fn segment_count(&self) -> usize {
        self.segments.read().len()
    }
}

impl std::fmt::Debug for InMemoryCommandStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCommandStore")
            .field("segments", &self.segment_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::encode_frame;

    fn frame(id: u64) -> Vec<u8> {
        encode_frame(
            &EntryRecord::Command {
                bytes: vec![id as u8; 8],
            },
            EntryId::new(id),
            id,
        )
        .unwrap()
    }

    fn append_all(store: &InMemoryCommandStore, ids: std::ops::RangeInclusive<u64>) {
        for id in ids {
            store.append_entry(EntryId::new(id), &frame(id)).unwrap();
        }
    }

    fn read_ids(store: &InMemoryCommandStore, from: u64) -> Vec<u64> {
        store
            .read_entries(EntryId::new(from))
            .unwrap()
            .map(|r| r.unwrap().id.as_u64())
            .collect()
    }

    #[test]
    fn single_segment_roundtrip() {
        let store = InMemoryCommandStore::new(RolloverStrategy::Never);
        append_all(&store, 1..=5);

        assert_eq!(store.segment_count(), 1);
        assert_eq!(read_ids(&store, 0), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn rollover_by_entry_count() {
        let store = InMemoryCommandStore::new(RolloverStrategy::MaxEntries(2));
        append_all(&store, 1..=5);

        assert_eq!(store.segment_count(), 3);
        assert_eq!(
            store.segment_first_ids(),
            vec![EntryId::new(1), EntryId::new(3), EntryId::new(5)]
        );
        assert_eq!(read_ids(&store, 0), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn rollover_never_seals_empty_segment() {
        // Threshold of zero would roll over before every append; the
        // non-empty guard keeps exactly one entry per segment.
        let store = InMemoryCommandStore::new(RolloverStrategy::MaxBytes(0));
        append_all(&store, 1..=3);

        assert_eq!(store.segment_count(), 3);
        assert_eq!(read_ids(&store, 0), vec![1, 2, 3]);
    }

    #[test]
    fn read_skips_to_containing_segment() {
        let store = InMemoryCommandStore::new(RolloverStrategy::MaxEntries(2));
        append_all(&store, 1..=6);

        // Segments: [1,2], [3,4], [5,6]. Reading from 4 must start at
        // the segment whose first id is 3.
        assert_eq!(read_ids(&store, 4), vec![3, 4, 5, 6]);
        assert_eq!(read_ids(&store, 5), vec![5, 6]);
    }

    #[test]
    fn read_from_beyond_end_returns_last_segment() {
        let store = InMemoryCommandStore::new(RolloverStrategy::MaxEntries(2));
        append_all(&store, 1..=6);

        assert_eq!(read_ids(&store, u64::MAX), vec![5, 6]);
    }
}
