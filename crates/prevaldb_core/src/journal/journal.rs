//! The command journal: id assignment, append, rollback, replay.

use crate::error::{CoreError, CoreResult};
use crate::journal::entry::{encode_frame, EntryRecord, JournalEntry};
use crate::store::CommandStore;
use crate::types::{now_millis, EntryId, Timestamp};
use parking_lot::Mutex;
use prevaldb_codec::Codec;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::iter::Peekable;
use std::marker::PhantomData;
use std::sync::Arc;

/// Append cursor state.
struct Cursor {
    /// Id the next command entry will receive.
    next_id: u64,
    /// Most recently appended command entry, if it has not been voided.
    last_command_id: Option<EntryId>,
    /// Whether the store holds any entry at all.
    has_entries: bool,
}

/// Append-only ordered log of commands and rollback markers.
///
/// The journal owns id assignment and rollback semantics; the
/// [`CommandStore`] underneath owns persistence and segmentation.
/// Command entry ids start at 1 and increase by one per append. A
/// rollback marker voids the most recently appended command entry and
/// is recorded with that entry's id, so the committed id sequence is
/// `1..=n` with voided ids absent.
pub struct CommandJournal<C> {
    store: Arc<dyn CommandStore>,
    codec: Arc<Codec>,
    cursor: Mutex<Cursor>,
    _commands: PhantomData<fn() -> C>,
}

impl<C> CommandJournal<C>
where
    C: Serialize + DeserializeOwned,
{
    /// Opens a journal over the given store, recovering the append
    /// cursor from the newest segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the newest segment cannot be read or is
    /// corrupted.
    pub fn open(store: Arc<dyn CommandStore>, codec: Arc<Codec>) -> CoreResult<Self> {
        let mut cursor = Cursor {
            next_id: 1,
            last_command_id: None,
            has_entries: false,
        };

        // u64::MAX selects the newest segment; the highest id lives there.
        for entry in store.read_entries(EntryId::new(u64::MAX))? {
            let entry = entry?;
            cursor.has_entries = true;
            match entry.item {
                EntryRecord::Command { .. } => {
                    cursor.next_id = entry.id.as_u64() + 1;
                    cursor.last_command_id = Some(entry.id);
                }
                EntryRecord::Rollback { .. } => {
                    // A marker carries the voided command's id; it may
                    // be the only entry in this segment if a rollover
                    // separated it from its command.
                    cursor.next_id = cursor.next_id.max(entry.id.as_u64() + 1);
                    cursor.last_command_id = None;
                }
                EntryRecord::ModelCreated { .. } => {}
            }
        }

        tracing::debug!(next_id = cursor.next_id, "journal opened");

        Ok(Self {
            store,
            codec,
            cursor: Mutex::new(cursor),
            _commands: PhantomData,
        })
    }

    /// Appends a command entry, assigning the next sequential id.
    ///
    /// `created` is persisted verbatim and is authoritative on replay.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be encoded or the store
    /// rejects the append.
    pub fn append(&self, command: &C, created: Timestamp) -> CoreResult<EntryId> {
        let bytes = self.codec.encode(command)?;

        let mut cursor = self.cursor.lock();
        let id = EntryId::new(cursor.next_id);
        let frame = encode_frame(&EntryRecord::Command { bytes }, id, created)?;
        self.store.append_entry(id, &frame)?;

        cursor.next_id += 1;
        cursor.last_command_id = Some(id);
        cursor.has_entries = true;
        Ok(id)
    }

    /// Appends a rollback marker voiding the most recently appended
    /// command entry.
    ///
    /// Markers are written only by the kernel, always as the entry
    /// immediately following the command they cancel.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if there is no command
    /// entry to void (or it was already voided), or a storage error if
    /// the append fails.
    pub fn write_rollback_marker(&self) -> CoreResult<()> {
        let mut cursor = self.cursor.lock();
        let target = cursor.last_command_id.ok_or_else(|| {
            CoreError::invalid_operation("no command entry available to roll back")
        })?;

        let frame = encode_frame(
            &EntryRecord::Rollback { command_id: target },
            target,
            now_millis(),
        )?;
        self.store.append_entry(target, &frame)?;

        cursor.last_command_id = None;
        tracing::warn!(entry = %target, "rollback marker written");
        Ok(())
    }

    /// Records the model type on a brand-new store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the store already
    /// holds entries.
    pub fn write_model_created(&self, type_id: &str) -> CoreResult<()> {
        let mut cursor = self.cursor.lock();
        if cursor.has_entries {
            return Err(CoreError::invalid_operation(
                "model creation marker only allowed on an empty journal",
            ));
        }

        let frame = encode_frame(
            &EntryRecord::ModelCreated {
                type_id: type_id.to_string(),
            },
            EntryId::new(0),
            now_millis(),
        )?;
        self.store.append_entry(EntryId::new(0), &frame)?;
        cursor.has_entries = true;
        Ok(())
    }

    /// Returns the model type recorded by the creation marker, if the
    /// journal starts with one.
    ///
    /// # Errors
    ///
    /// Returns an error if the first segment cannot be read.
    pub fn model_type(&self) -> CoreResult<Option<String>> {
        let mut entries = self.store.read_entries(EntryId::new(0))?;
        match entries.next() {
            Some(Ok(JournalEntry {
                item: EntryRecord::ModelCreated { type_id },
                ..
            })) => Ok(Some(type_id)),
            Some(Ok(_)) | None => Ok(None),
            Some(Err(e)) => Err(e),
        }
    }

    /// Returns whether the journal holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.cursor.lock().has_entries
    }

    /// Returns the id the next command entry will receive.
    #[must_use]
    pub fn next_id(&self) -> EntryId {
        EntryId::new(self.cursor.lock().next_id)
    }

    /// Flushes the underlying store.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.store.flush()
    }

    /// Iterates committed command entries with id > `after`, in order.
    ///
    /// A command entry is committed only if the entry immediately
    /// following it is not a rollback marker for its id; voided entries
    /// are excluded from the stream entirely. This single-entry
    /// look-ahead is the source of truth for rollback semantics.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn committed_entries(&self, after: u64) -> CoreResult<CommittedCommands<C>> {
        let raw = self
            .store
            .read_entries(EntryId::new(after.saturating_add(1)))?;
        Ok(CommittedCommands {
            inner: raw.peekable(),
            codec: Arc::clone(&self.codec),
            after,
            _commands: PhantomData,
        })
    }
}

impl<C> std::fmt::Debug for CommandJournal<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cursor = self.cursor.lock();
        f.debug_struct("CommandJournal")
            .field("next_id", &cursor.next_id)
            .field("last_command_id", &cursor.last_command_id)
            .finish_non_exhaustive()
    }
}

type RawEntries = Box<dyn Iterator<Item = CoreResult<JournalEntry<EntryRecord>>> + Send>;

/// Iterator over the committed command entries of a journal.
pub struct CommittedCommands<C> {
    inner: Peekable<RawEntries>,
    codec: Arc<Codec>,
    after: u64,
    _commands: PhantomData<fn() -> C>,
}

impl<C> Iterator for CommittedCommands<C>
where
    C: DeserializeOwned,
{
    type Item = CoreResult<JournalEntry<C>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };

            let bytes = match entry.item {
                EntryRecord::Command { bytes } => bytes,
                // Markers never appear in the committed stream. A marker
                // reached here belongs to a command earlier than the
                // requested range.
                EntryRecord::Rollback { .. } | EntryRecord::ModelCreated { .. } => continue,
            };

            // Single-entry look-ahead: a following marker for this id
            // voids the command.
            let voided = matches!(
                self.inner.peek(),
                Some(Ok(JournalEntry {
                    item: EntryRecord::Rollback { command_id },
                    ..
                })) if *command_id == entry.id
            );
            if voided {
                self.inner.next();
                continue;
            }

            if entry.id.as_u64() <= self.after {
                continue;
            }

            return Some(match self.codec.decode::<C>(&bytes) {
                Ok(command) => Ok(JournalEntry {
                    id: entry.id,
                    created: entry.created,
                    item: command,
                }),
                Err(e) => Err(e.into()),
            });
        }
    }
}
