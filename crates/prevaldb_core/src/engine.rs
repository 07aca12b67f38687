//! Engine facade.

use crate::command::{Command, CommandError, Context, Query};
use crate::config::EngineConfig;
use crate::dir::EngineDir;
use crate::error::{CoreError, CoreResult};
use crate::isolation::CloneStrategy;
use crate::journal::CommandJournal;
use crate::kernel::{EngineState, KernelEnv, KernelStrategy};
use crate::loader::{encode_snapshot_bytes, ModelLoader};
use crate::model::Model;
use crate::snapshot::{FileSnapshotStore, InMemorySnapshotStore, SnapshotMeta, SnapshotStore};
use crate::store::{CommandStore, FileCommandStore, InMemoryCommandStore};
use crate::sync::Synchronizer;
use crate::types::now_millis;
use prevaldb_codec::Codec;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::type_name;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The prevalence engine: accepts commands and queries against a
/// single in-memory model, journals every mutation, and reconstructs
/// state from snapshot + journal after a restart.
///
/// `M` is the application's model type and `C` its command type,
/// typically a serde enum, giving a statically-typed command table
/// instead of reflection-based dispatch. Queries are per-call generic.
///
/// The engine is `Sync`; share it behind an `Arc` and call it from as
/// many threads as you like. The configured synchronizer serializes
/// access.
///
/// # Example
///
/// ```rust,ignore
/// let engine: Engine<Ledger, LedgerCommand> =
///     Engine::open(Path::new("my_ledger"), EngineConfig::default())?;
///
/// engine.execute_command(LedgerCommand::Deposit {
///     account: "alice".into(),
///     amount: 100,
/// })?;
/// let balance = engine.execute_query(&BalanceQuery { account: "alice".into() })?;
///
/// engine.create_snapshot()?;
/// engine.close()?;
/// ```
pub struct Engine<M: Model, C: Command<M>> {
    kernel: KernelStrategy,
    isolation: CloneStrategy,
    lock_timeout: Duration,
    snapshot_checksums: bool,
    codec: Arc<Codec>,
    journal: CommandJournal<C>,
    snapshots: Arc<dyn SnapshotStore>,
    sync: Synchronizer<EngineState<M>>,
    closed: AtomicBool,
    _dir: Option<EngineDir>,
}

impl<M, C> Engine<M, C>
where
    M: Model,
    C: Command<M>,
{
    /// Opens a persistent engine in the given directory.
    ///
    /// Creates the directory if missing, acquires its exclusive lock,
    /// and recovers the model from the newest snapshot plus journal
    /// replay.
    ///
    /// # Errors
    ///
    /// Returns an error if another process holds the directory lock,
    /// stored data is corrupted or was created for a different model
    /// type, or recovery fails.
    pub fn open(path: &Path, config: EngineConfig) -> CoreResult<Self> {
        let dir = EngineDir::open(path)?;
        let store = Arc::new(FileCommandStore::open(
            &dir.journal_dir(),
            config.rollover.clone(),
            config.flush_on_append,
        )?);
        let snapshots = Arc::new(FileSnapshotStore::open(&dir.snapshots_dir())?);
        Self::boot(config, store, snapshots, Some(dir))
    }

    /// Opens a fresh non-persistent engine for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if recovery fails (it cannot for empty stores).
    pub fn open_in_memory(config: EngineConfig) -> CoreResult<Self> {
        let store = Arc::new(InMemoryCommandStore::new(config.rollover.clone()));
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        Self::boot(config, store, snapshots, None)
    }

    /// Opens an engine over pre-configured stores.
    ///
    /// This is the seam for custom [`CommandStore`]/[`SnapshotStore`]
    /// implementations; `open` and `open_in_memory` are wrappers
    /// around it.
    ///
    /// # Errors
    ///
    /// Returns an error if recovery from the given stores fails.
    pub fn with_stores(
        config: EngineConfig,
        store: Arc<dyn CommandStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> CoreResult<Self> {
        Self::boot(config, store, snapshots, None)
    }

    fn boot(
        config: EngineConfig,
        store: Arc<dyn CommandStore>,
        snapshots: Arc<dyn SnapshotStore>,
        dir: Option<EngineDir>,
    ) -> CoreResult<Self> {
        let codec = Arc::new(Codec::with_type_map(config.type_map.clone()));
        let journal = CommandJournal::open(store, Arc::clone(&codec))?;

        // Record the model type once on a brand-new store.
        if journal.is_empty() && snapshots.list_snapshots()?.is_empty() {
            journal.write_model_created(type_name::<M>())?;
        }

        let loader = ModelLoader::new(&journal, snapshots.as_ref(), &codec);
        let (mut model, revision) = loader.load_model::<M>()?;
        model.starting();

        tracing::debug!(revision, kernel = ?config.kernel, "engine started");

        Ok(Self {
            kernel: config.kernel,
            isolation: config.isolation,
            lock_timeout: config.lock_timeout,
            snapshot_checksums: config.snapshot_checksums,
            codec,
            journal,
            snapshots,
            sync: Synchronizer::new(config.synchronization, EngineState { model, revision }),
            closed: AtomicBool::new(false),
            _dir: dir,
        })
    }

    /// Executes a command through the configured kernel strategy.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Aborted`] if the command declined to commit or an
    ///   unexpected failure was compensated
    /// - [`CoreError::LockTimeout`] if access was not granted in time
    ///   (the model was never touched)
    /// - [`CoreError::Fatal`] if durable storage failed; the engine is
    ///   closed afterwards
    /// - [`CoreError::EngineClosed`] once the engine has closed
    pub fn execute_command(&self, command: C) -> CoreResult<C::Output> {
        self.ensure_open()?;

        let command = if self
            .isolation
            .requires_clone(command.isolation(), type_name::<C>())
        {
            self.codec.deep_clone(&command)?
        } else {
            command
        };

        let env = self.kernel_env();
        let output = self.kernel.run_command(&env, &command)?;
        self.isolate_output::<C::Output>(command.isolation(), output)
    }

    /// Executes a read-only query against a consistent view of the
    /// model.
    ///
    /// Under the immutability kernel the query runs against a pinned
    /// clone of the current value and may overlap concurrent commits;
    /// under the other kernels it holds read access for its duration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Aborted`] if the query reports a failure,
    /// [`CoreError::LockTimeout`] if read access was not granted in
    /// time, or [`CoreError::EngineClosed`] once the engine has closed.
    pub fn execute_query<Q: Query<M>>(&self, query: &Q) -> CoreResult<Q::Output> {
        self.ensure_open()?;
        let ctx = Context {
            timestamp: now_millis(),
        };

        let result = match self.kernel {
            KernelStrategy::Immutability => {
                let pinned = {
                    let guard = self.sync.enter_read(self.lock_timeout)?;
                    guard.model.clone()
                };
                query.query(&pinned, &ctx)
            }
            _ => {
                let guard = self.sync.enter_read(self.lock_timeout)?;
                query.query(&guard.model, &ctx)
            }
        };

        let output = result.map_err(|e| match e {
            CommandError::Abort(reason) => CoreError::Aborted { reason },
            CommandError::Failed(message) => CoreError::aborted(format!("query failed: {message}")),
        })?;

        self.isolate_output::<Q::Output>(query.isolation(), output)
    }

    /// Writes a full-state snapshot tagged with the current revision.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be serialized or the
    /// snapshot store rejects the write.
    pub fn create_snapshot(&self) -> CoreResult<SnapshotMeta> {
        self.ensure_open()?;
        let guard = self.sync.enter_read(self.lock_timeout)?;

        let meta = SnapshotMeta {
            revision: guard.revision,
            created: now_millis(),
        };
        let bytes = encode_snapshot_bytes(
            &self.codec,
            &guard.model,
            &meta,
            self.snapshot_checksums,
        )?;
        self.snapshots.write_snapshot(&meta, &bytes)?;

        tracing::debug!(revision = meta.revision, "snapshot created");
        Ok(meta)
    }

    /// Returns the id of the last committed command entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] if read access was not
    /// granted in time.
    pub fn revision(&self) -> CoreResult<u64> {
        self.ensure_open()?;
        Ok(self.sync.enter_read(self.lock_timeout)?.revision)
    }

    /// Closes the engine. All subsequent operations fail fast with
    /// [`CoreError::EngineClosed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the final journal flush fails.
    pub fn close(&self) -> CoreResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.journal.flush()?;
            tracing::debug!("engine closed");
        }
        Ok(())
    }

    /// Returns whether the engine has closed (explicitly or after a
    /// fatal failure).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_closed() {
            return Err(CoreError::EngineClosed);
        }
        Ok(())
    }

    fn kernel_env(&self) -> KernelEnv<'_, M, C> {
        KernelEnv {
            sync: &self.sync,
            journal: &self.journal,
            snapshots: self.snapshots.as_ref(),
            codec: &self.codec,
            lock_timeout: self.lock_timeout,
            closed: &self.closed,
        }
    }

    fn isolate_output<T>(&self, declared: crate::isolation::Isolation, value: T) -> CoreResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.isolation.requires_clone(declared, type_name::<T>()) {
            Ok(self.codec.deep_clone(&value)?)
        } else {
            Ok(value)
        }
    }
}

impl<M: Model, C: Command<M>> std::fmt::Debug for Engine<M, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("kernel", &self.kernel)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
