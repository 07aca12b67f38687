//! Command and query traits.

use crate::isolation::Isolation;
use crate::model::Model;
use crate::types::Timestamp;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Execution context passed to commands and queries.
///
/// The timestamp is assigned once per command on the live path and
/// persisted in the journal entry; replay passes the persisted value
/// back, so command logic that needs the current time must read it
/// from here rather than the wall clock to stay deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    /// Authoritative timestamp for this operation.
    pub timestamp: Timestamp,
}

/// Failure reported by command or query logic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The command declines to commit. The engine treats this as
    /// "no effect": nothing is journaled (an already-journaled entry is
    /// voided), no recovery runs, and the error reaches the caller
    /// unchanged. Command logic must abort before mutating the model.
    #[error("abort: {0}")]
    Abort(String),

    /// The command failed unexpectedly and may have left the model
    /// partially mutated. The active kernel decides whether the model
    /// must be rebuilt from snapshot + journal replay.
    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    /// Creates an explicit abort.
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::Abort(reason.into())
    }

    /// Creates an unexpected failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A unit of intended mutation.
///
/// Commands are journaled, so they must round-trip through the engine
/// codec; the application's command set is typically a single serde
/// enum implementing this trait. Replay re-executes committed commands
/// in order against a recovering model, which requires `execute` to be
/// deterministic given the model and the [`Context`].
pub trait Command<M: Model>: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The value returned to the caller on success.
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Validation phase, run under an upgradable read lock before the
    /// exclusive mutation phase. May read the model and abort; it
    /// cannot mutate.
    fn prepare(&self, _model: &M, _ctx: &Context) -> Result<(), CommandError> {
        Ok(())
    }

    /// Mutation phase, run under the write lock.
    fn execute(&self, model: &mut M, ctx: &Context) -> Result<Self::Output, CommandError>;

    /// Isolation declared by this command for its input and output
    /// values, consulted by the heuristic clone strategy.
    fn isolation(&self) -> Isolation {
        Isolation::Unspecified
    }
}

/// A read-only operation.
///
/// Queries never touch the journal and take no write lock, so they are
/// not required to be serializable themselves; only their output is,
/// because results may be deep-copied on the way out.
pub trait Query<M: Model> {
    /// The value returned to the caller.
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Runs the query against a consistent view of the model.
    fn query(&self, model: &M, ctx: &Context) -> Result<Self::Output, CommandError>;

    /// Isolation declared by this query for its output, consulted by
    /// the heuristic clone strategy.
    fn isolation(&self) -> Isolation {
        Isolation::Unspecified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_formats_reason() {
        let err = CommandError::abort("balance too low");
        assert_eq!(err.to_string(), "abort: balance too low");
    }

    #[test]
    fn failed_formats_message() {
        let err = CommandError::failed("index out of range");
        assert_eq!(err.to_string(), "index out of range");
    }
}
