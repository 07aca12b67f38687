//! # PrevalDB Core
//!
//! Execution and recovery engine for PrevalDB, an embedded
//! prevalence-style object database: the entire application data model
//! lives as an in-memory object graph, every mutation is recorded as a
//! command in an append-only journal, and full-state snapshots bound
//! replay time. On restart, the newest snapshot plus the journal
//! entries written after it reconstruct the exact in-memory state.
//!
//! This crate provides:
//! - [`Engine`] - the caller-facing facade (commands, queries,
//!   snapshots, close)
//! - [`KernelStrategy`] - four interchangeable transaction strategies
//! - [`CommandJournal`] and pluggable [`CommandStore`]s with segment
//!   rollover
//! - [`SnapshotStore`]s and the [`ModelLoader`] recovery path
//! - [`Synchronizer`] - timed read/upgrade/write model access
//! - [`CloneStrategy`] - isolation of values crossing the engine
//!   boundary
//!
//! ## Writing an application
//!
//! Define a model type implementing [`Model`] and a command enum
//! implementing [`Command`]; both must round-trip through serde.
//! Queries implement [`Query`] per type. Open an [`Engine`] over a
//! directory (or in memory) and submit operations from any number of
//! threads.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod config;
mod dir;
mod engine;
mod error;
mod isolation;
mod journal;
mod kernel;
mod loader;
mod model;
mod snapshot;
mod store;
mod sync;
mod types;

#[cfg(test)]
mod testing;

pub use command::{Command, CommandError, Context, Query};
pub use config::EngineConfig;
pub use dir::EngineDir;
pub use engine::Engine;
pub use error::{CoreError, CoreResult};
pub use isolation::{CloneStrategy, ImmutableTypes, Isolation};
pub use journal::{CommandJournal, CommittedCommands, EntryKind, EntryRecord, JournalEntry};
pub use kernel::KernelStrategy;
pub use loader::ModelLoader;
pub use model::Model;
pub use snapshot::{
    FileSnapshotStore, InMemorySnapshotStore, SnapshotHeader, SnapshotMeta, SnapshotStore,
};
pub use store::{CommandStore, FileCommandStore, InMemoryCommandStore, RolloverStrategy};
pub use sync::{ReadGuard, SyncPolicy, Synchronizer, Upgrade, UpgradeGuard, WriteGuard};
pub use types::{now_millis, EntryId, Timestamp};
