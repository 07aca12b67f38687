//! Error types for the PrevalDB engine.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in engine operations.
///
/// The taxonomy the engine guarantees to callers:
///
/// - [`CoreError::Aborted`] - command logic declined to commit, or an
///   unexpected command failure was compensated by a model rebuild.
///   The model reflects exactly the committed journal.
/// - [`CoreError::LockTimeout`] - access was not granted within the
///   configured budget; no state was touched.
/// - [`CoreError::Fatal`] - journal or snapshot storage is unusable;
///   the engine has closed and all subsequent operations fail fast.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] prevaldb_storage::StorageError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] prevaldb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A command declined to commit, or a failed command was rolled
    /// back. The model is unchanged relative to the committed journal.
    #[error("aborted: {reason}")]
    Aborted {
        /// Why the operation did not commit.
        reason: String,
    },

    /// Lock acquisition did not complete within the configured budget.
    #[error("{mode} lock not acquired within {waited_ms} ms")]
    LockTimeout {
        /// The access mode that was requested.
        mode: &'static str,
        /// The timeout budget in milliseconds.
        waited_ms: u64,
    },

    /// The journal contains invalid or unreadable data.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A snapshot contains invalid or unreadable data.
    #[error("snapshot corruption: {message}")]
    SnapshotCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A committed journal entry failed to re-execute during recovery.
    #[error("replay failed at entry {id}: {reason}")]
    ReplayFailed {
        /// Id of the entry that failed.
        id: u64,
        /// The failure reported by the command.
        reason: String,
    },

    /// The requested snapshot does not exist in the store.
    #[error("snapshot not found for revision {revision}")]
    SnapshotNotFound {
        /// Revision of the missing snapshot.
        revision: u64,
    },

    /// Stored data does not match the expected format or model type.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Another process holds the engine directory lock.
    #[error("engine locked: another process has exclusive access")]
    EngineLocked,

    /// The engine has been closed; no further operations are accepted.
    #[error("engine is closed")]
    EngineClosed,

    /// Journal or snapshot storage failed in a way the engine cannot
    /// compensate for. The engine has transitioned to closed.
    #[error("fatal: {message}")]
    Fatal {
        /// Description of the failure.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates a lock timeout error for the given access mode.
    #[must_use]
    pub fn lock_timeout(mode: &'static str, waited: Duration) -> Self {
        Self::LockTimeout {
            mode,
            waited_ms: waited.as_millis() as u64,
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates a snapshot corruption error.
    pub fn snapshot_corruption(message: impl Into<String>) -> Self {
        Self::SnapshotCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns whether this error is an explicit or compensated abort,
    /// as opposed to a timeout or an engine-level failure.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
