//! The command journal.
//!
//! The journal is the durable, ordered, append-only record of intended
//! mutations. Every committed command is written here before or after
//! execution (depending on the kernel strategy), and replaying the
//! committed entries after the newest snapshot reconstructs the exact
//! in-memory model.
//!
//! ## Entry Format
//!
//! ```text
//! | magic (4) | version (2) | kind (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! Payloads start with the entry id (8) and creation timestamp (8);
//! the remainder depends on the kind: command entries carry codec bytes
//! of the command, rollback markers carry the id of the entry they
//! void, and the model-creation marker carries a type identifier.
//!
//! ## Rollback semantics
//!
//! A rollback marker voids the command entry immediately before it.
//! Replay applies a single-entry look-ahead: a command entry is
//! **committed** only if the entry immediately following it is not a
//! rollback marker for its id. Voided entries are excluded from the
//! replay stream entirely. This look-ahead rule, not a secondary
//! index, is the source of truth for rollback.
//!
//! ## Recovery Policy
//!
//! Reading tolerates a truncated trailing entry (a crash mid-write
//! before flush) as a clean end of log. CRC mismatches, bad magic,
//! unknown kinds, and future format versions are corruption errors and
//! abort the open.

mod entry;
mod journal;
mod reader;

pub use entry::{decode_frame, encode_frame, EntryKind, EntryRecord, JournalEntry};
pub use journal::{CommandJournal, CommittedCommands};
pub use reader::SegmentFrames;
