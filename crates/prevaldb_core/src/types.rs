//! Core type definitions for PrevalDB.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a journal entry.
///
/// Command entry ids are assigned at append time and strictly increase,
/// including across segment boundaries. A rollback marker is recorded
/// with the id of the command entry it voids, so the committed command
/// id sequence is gap-free apart from voided entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u64);

impl EntryId {
    /// Creates a new entry id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next entry id.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry:{}", self.0)
    }
}

/// Milliseconds since the Unix epoch.
///
/// Timestamps are assigned once per command on the live path and
/// persisted verbatim in the journal; on replay the persisted value is
/// authoritative, never the wall clock.
pub type Timestamp = u64;

/// Returns the current wall-clock time in milliseconds since the epoch.
#[must_use]
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
