//! Segmented file command store.

use crate::error::{CoreError, CoreResult};
use crate::journal::{EntryRecord, JournalEntry, SegmentFrames};
use crate::store::{CommandStore, RolloverStrategy};
use crate::types::EntryId;
use parking_lot::Mutex;
use prevaldb_storage::{FileBackend, StorageBackend};
use std::path::{Path, PathBuf};

/// File extension for journal segments.
const SEGMENT_EXT: &str = "journal";

/// The active (unsealed) segment.
struct ActiveSegment {
    backend: FileBackend,
    entries: u64,
}

struct FileStoreState {
    /// Sequence number the next segment will receive.
    next_seq: u64,
    active: Option<ActiveSegment>,
}

/// A command store writing size/count-bounded segment files.
///
/// Segment file names encode a monotonically increasing sequence
/// number and the id of the first contained entry:
///
/// ```text
/// <seq:09>.<first_id:012>.journal      e.g. 000000002.000000000145.journal
/// ```
///
/// so a reader can locate the segment containing a requested starting
/// id from the directory listing alone, without scanning earlier
/// segments.
pub struct FileCommandStore {
    dir: PathBuf,
    rollover: RolloverStrategy,
    flush_on_append: bool,
    state: Mutex<FileStoreState>,
}

fn segment_file_name(seq: u64, first_id: EntryId) -> String {
    format!("{seq:09}.{:012}.{SEGMENT_EXT}", first_id.as_u64())
}

fn parse_segment_name(name: &str) -> Option<(u64, EntryId)> {
    let mut parts = name.split('.');
    let seq = parts.next()?.parse().ok()?;
    let first_id = parts.next()?.parse().ok()?;
    if parts.next()? != SEGMENT_EXT || parts.next().is_some() {
        return None;
    }
    Some((seq, EntryId::new(first_id)))
}

/// Lists segments in a directory, ordered by sequence number.
fn list_segments(dir: &Path) -> CoreResult<Vec<(u64, EntryId, PathBuf)>> {
    let mut segments = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some((seq, first_id)) = parse_segment_name(name) {
            segments.push((seq, first_id, entry.path()));
        }
    }
    segments.sort_by_key(|(seq, _, _)| *seq);
    Ok(segments)
}

impl FileCommandStore {
    /// Opens a store over the given directory, creating it if missing.
    ///
    /// The newest segment is scanned to derive its rollover bookkeeping
    /// (entry count and byte size are never persisted). A segment with
    /// a truncated tail (a crash mid-append) is sealed as-is; the
    /// next append starts a fresh segment so the damaged tail can never
    /// shadow later entries.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if the newest segment is
    /// corrupted (beyond a truncated tail).
    pub fn open(
        dir: &Path,
        rollover: RolloverStrategy,
        flush_on_append: bool,
    ) -> CoreResult<Self> {
        std::fs::create_dir_all(dir)?;

        let segments = list_segments(dir)?;
        let mut state = FileStoreState {
            next_seq: 1,
            active: None,
        };

        if let Some((seq, _, path)) = segments.last() {
            state.next_seq = seq + 1;

            let backend = FileBackend::open(path)?;
            let file_size = backend.size()?;

            let mut frames = SegmentFrames::new(Box::new(FileBackend::open(path)?))?;
            let mut entries = 0u64;
            for frame in &mut frames {
                frame?;
                entries += 1;
            }

            if frames.offset() == file_size {
                state.active = Some(ActiveSegment { backend, entries });
            } else {
                // Damaged tail; seal this segment and let the next
                // append open a new one after it.
                tracing::warn!(
                    segment = %path.display(),
                    valid_bytes = frames.offset(),
                    file_size,
                    "sealing segment with truncated tail"
                );
            }
        }

        tracing::debug!(dir = %dir.display(), segments = segments.len(), "file command store opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            rollover,
            flush_on_append,
            state: Mutex::new(state),
        })
    }

    fn start_segment(&self, state: &mut FileStoreState, first_id: EntryId) -> CoreResult<()> {
        let seq = state.next_seq;
        let path = self.dir.join(segment_file_name(seq, first_id));
        let backend = FileBackend::open(&path)?;

        state.next_seq = seq + 1;
        state.active = Some(ActiveSegment {
            backend,
            entries: 0,
        });

        tracing::debug!(segment = %path.display(), "journal segment started");
        Ok(())
    }
}

impl CommandStore for FileCommandStore {
    fn append_entry(&self, id: EntryId, frame: &[u8]) -> CoreResult<()> {
        let mut state = self.state.lock();

        let needs_new = match &state.active {
            None => true,
            Some(active) => {
                active.entries > 0
                    && self
                        .rollover
                        .should_rollover(active.backend.size()?, active.entries)
            }
        };

        if needs_new {
            if let Some(active) = &mut state.active {
                active.backend.flush()?;
                active.backend.sync()?;
            }
            self.start_segment(&mut state, id)?;
        }

        if let Some(active) = &mut state.active {
            active.backend.append(frame)?;
            if self.flush_on_append {
                active.backend.flush()?;
                active.backend.sync()?;
            }
            active.entries += 1;
        }
        Ok(())
    }

    fn read_entries(
        &self,
        from_id: EntryId,
    ) -> CoreResult<Box<dyn Iterator<Item = CoreResult<JournalEntry<EntryRecord>>> + Send>> {
        // Hold the append lock while listing so a concurrent rollover
        // cannot split the directory view.
        let _state = self.state.lock();
        let segments = list_segments(&self.dir)?;

        let start = segments
            .iter()
            .rposition(|(_, first_id, _)| *first_id <= from_id)
            .unwrap_or(0);

        let paths: Vec<PathBuf> = segments[start..]
            .iter()
            .map(|(_, _, path)| path.clone())
            .collect();

        Ok(Box::new(ChainedSegments {
            paths: paths.into_iter(),
            current: None,
            failed: false,
        }))
    }

    fn flush(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        if let Some(active) = &mut state.active {
            active.backend.flush()?;
            active.backend.sync()?;
        }
        Ok(())
    }

    fn segment_count(&self) -> usize {
        list_segments(&self.dir).map_or(0, |s| s.len())
    }
}

impl std::fmt::Debug for FileCommandStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCommandStore")
            .field("dir", &self.dir)
            .field("flush_on_append", &self.flush_on_append)
            .finish_non_exhaustive()
    }
}

/// Iterates entries across consecutive segment files.
struct ChainedSegments {
    paths: std::vec::IntoIter<PathBuf>,
    current: Option<SegmentFrames>,
    failed: bool,
}

impl Iterator for ChainedSegments {
    type Item = CoreResult<JournalEntry<EntryRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            if let Some(current) = &mut self.current {
                match current.next() {
                    Some(Ok(entry)) => return Some(Ok(entry)),
                    Some(Err(e)) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
            }

            let path = self.paths.next()?;
            match FileBackend::open(&path)
                .map_err(CoreError::from)
                .and_then(|b| SegmentFrames::new(Box::new(b)))
            {
                Ok(frames) => self.current = Some(frames),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
