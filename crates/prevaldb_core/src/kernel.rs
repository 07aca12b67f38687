//! Kernel strategies: the per-command transaction state machine.
//!
//! A command moves through Idle → Preparing → Mutating → Committed
//! within a single `run_command` call; the kernel holds no state of its
//! own between operations beyond the model cell and the journal
//! cursor. The four strategies trade failure cost against hot-path
//! cost and are interchangeable per engine instance.
//!
//! Every strategy takes the upgradable lock before touching the
//! journal, so journal append order is identical to write-phase order
//! and replay reproduces commit order exactly.

use crate::command::{Command, CommandError, Context};
use crate::error::{CoreError, CoreResult};
use crate::journal::CommandJournal;
use crate::loader::ModelLoader;
use crate::model::Model;
use crate::snapshot::SnapshotStore;
use crate::sync::{Synchronizer, Upgrade, WriteGuard};
use crate::types::{now_millis, EntryId};
use prevaldb_codec::Codec;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Transaction execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelStrategy {
    /// Append to the journal *before* execution, assuming success.
    ///
    /// Lowest latency on the hot path (one sequential journal write,
    /// no second round-trip). An unexpected failure during execution
    /// is expensive: the speculative entry is voided with a rollback
    /// marker and the model is rebuilt from snapshot + replay.
    /// Acceptable when command failures are rare.
    Optimistic,

    /// Execute first, journal only after success.
    ///
    /// The journal never contains speculative entries, so failure
    /// handling is cheap on the durable side; the model is still
    /// rebuilt after an unexpected failure because execution may have
    /// partially mutated it.
    Pessimistic,

    /// Trial-execute against a disposable deep copy of the model; only
    /// a successful trial is journaled and installed.
    ///
    /// The live model is never observed in a partially-mutated state,
    /// at double execution cost (here paid as a deep copy). Appropriate
    /// when commands are not provably safe and full-rebuild recovery is
    /// too expensive to run per failure.
    RoyalFoodTaster,

    /// Execute against a clone of the model value and swap the root
    /// reference after successful execution and journaling.
    ///
    /// Failures never touch the live model, and queries pin the value
    /// they started with, so a read can span a concurrent commit and
    /// still observe one consistent revision throughout. Intended for
    /// models whose clone is cheap (persistent data structures).
    Immutability,
}

/// The engine's shared mutable state: the model and its revision.
///
/// Revision is the id of the last committed command entry applied to
/// this model instance.
#[derive(Debug)]
pub(crate) struct EngineState<M> {
    pub model: M,
    pub revision: u64,
}

/// Handles a kernel strategy needs to drive one command.
pub(crate) struct KernelEnv<'a, M: Model, C: Command<M>> {
    pub sync: &'a Synchronizer<EngineState<M>>,
    pub journal: &'a CommandJournal<C>,
    pub snapshots: &'a dyn SnapshotStore,
    pub codec: &'a Codec,
    pub lock_timeout: Duration,
    pub closed: &'a AtomicBool,
}

impl KernelStrategy {
    /// Runs one command to completion under this strategy.
    pub(crate) fn run_command<M, C>(
        self,
        env: &KernelEnv<'_, M, C>,
        command: &C,
    ) -> CoreResult<C::Output>
    where
        M: Model,
        C: Command<M>,
    {
        match self {
            Self::Optimistic => run_optimistic(env, command),
            Self::Pessimistic => run_pessimistic(env, command),
            Self::RoyalFoodTaster => run_taster(env, command),
            Self::Immutability => run_immutability(env, command),
        }
    }
}

fn run_optimistic<M, C>(env: &KernelEnv<'_, M, C>, command: &C) -> CoreResult<C::Output>
where
    M: Model,
    C: Command<M>,
{
    let guard = env.sync.enter_upgrade(env.lock_timeout)?;
    let created = now_millis();
    let id = append_entry(env, command, created)?;
    let ctx = Context { timestamp: created };

    if let Err(e) = command.prepare(&guard.model, &ctx) {
        // The speculative entry must be voided either way; prepare only
        // reads, so the model needs no rebuild.
        void_last_entry(env)?;
        return Err(abort_error(e, "prepare"));
    }

    let mut guard = match Synchronizer::upgrade(guard, env.lock_timeout) {
        Upgrade::Acquired(guard) => guard,
        Upgrade::TimedOut(guard) => {
            // The journaled entry will never execute. Void it while
            // still holding upgradable access, then surface the
            // timeout unchanged; the model was never touched.
            void_last_entry(env)?;
            drop(guard);
            return Err(CoreError::lock_timeout("write", env.lock_timeout));
        }
    };

    match run_execute(command, &mut guard.model, &ctx) {
        Ok(output) => {
            guard.revision = id.as_u64();
            Ok(output)
        }
        Err(CommandError::Abort(reason)) => {
            // Declared no-effect; void the entry, keep the model.
            void_last_entry(env)?;
            Err(CoreError::Aborted { reason })
        }
        Err(CommandError::Failed(message)) => {
            // Marker before rebuild: replay must not see the failed
            // entry as committed.
            void_last_entry(env)?;
            rebuild(env, &mut guard)?;
            Err(CoreError::aborted(format!(
                "command failed during execute: {message}"
            )))
        }
    }
}

fn run_pessimistic<M, C>(env: &KernelEnv<'_, M, C>, command: &C) -> CoreResult<C::Output>
where
    M: Model,
    C: Command<M>,
{
    let guard = env.sync.enter_upgrade(env.lock_timeout)?;
    let created = now_millis();
    let ctx = Context { timestamp: created };

    if let Err(e) = command.prepare(&guard.model, &ctx) {
        return match e {
            CommandError::Abort(reason) => Err(CoreError::Aborted { reason }),
            CommandError::Failed(message) => {
                let mut guard = match Synchronizer::upgrade(guard, env.lock_timeout) {
                    Upgrade::Acquired(guard) => guard,
                    Upgrade::TimedOut(guard) => {
                        drop(guard);
                        return Err(fatal(env, "write lock unavailable for model rebuild"));
                    }
                };
                rebuild(env, &mut guard)?;
                Err(CoreError::aborted(format!(
                    "command failed during prepare: {message}"
                )))
            }
        };
    }

    let mut guard = match Synchronizer::upgrade(guard, env.lock_timeout) {
        Upgrade::Acquired(guard) => guard,
        Upgrade::TimedOut(guard) => {
            drop(guard);
            return Err(CoreError::lock_timeout("write", env.lock_timeout));
        }
    };

    match run_execute(command, &mut guard.model, &ctx) {
        Ok(output) => {
            // Only now does the command touch durable storage.
            let id = append_entry(env, command, created)?;
            guard.revision = id.as_u64();
            Ok(output)
        }
        Err(CommandError::Abort(reason)) => Err(CoreError::Aborted { reason }),
        Err(CommandError::Failed(message)) => {
            rebuild(env, &mut guard)?;
            Err(CoreError::aborted(format!(
                "command failed during execute: {message}"
            )))
        }
    }
}

fn run_taster<M, C>(env: &KernelEnv<'_, M, C>, command: &C) -> CoreResult<C::Output>
where
    M: Model,
    C: Command<M>,
{
    let guard = env.sync.enter_upgrade(env.lock_timeout)?;
    let created = now_millis();
    let ctx = Context { timestamp: created };

    if let Err(e) = command.prepare(&guard.model, &ctx) {
        return Err(abort_error(e, "prepare"));
    }

    let mut taster: M = env.codec.deep_clone(&guard.model)?;
    let output = match run_execute(command, &mut taster, &ctx) {
        Ok(output) => output,
        Err(CommandError::Abort(reason)) => return Err(CoreError::Aborted { reason }),
        Err(CommandError::Failed(message)) => {
            // The trial absorbed the damage; live model and journal are
            // untouched, so no rebuild.
            return Err(CoreError::aborted(format!(
                "command failed against the taster: {message}"
            )));
        }
    };

    let mut guard = match Synchronizer::upgrade(guard, env.lock_timeout) {
        Upgrade::Acquired(guard) => guard,
        Upgrade::TimedOut(guard) => {
            drop(guard);
            return Err(CoreError::lock_timeout("write", env.lock_timeout));
        }
    };

    let id = append_entry(env, command, created)?;
    // Install the trial result instead of re-executing against the
    // live model.
    guard.model = taster;
    guard.revision = id.as_u64();
    Ok(output)
}

fn run_immutability<M, C>(env: &KernelEnv<'_, M, C>, command: &C) -> CoreResult<C::Output>
where
    M: Model,
    C: Command<M>,
{
    let guard = env.sync.enter_upgrade(env.lock_timeout)?;
    let created = now_millis();
    let ctx = Context { timestamp: created };

    if let Err(e) = command.prepare(&guard.model, &ctx) {
        return Err(abort_error(e, "prepare"));
    }

    let mut next = guard.model.clone();
    let output = match run_execute(command, &mut next, &ctx) {
        Ok(output) => output,
        Err(CommandError::Abort(reason)) => return Err(CoreError::Aborted { reason }),
        Err(CommandError::Failed(message)) => {
            // The live value was never touched; prior references stay
            // valid and nothing was journaled.
            return Err(CoreError::aborted(format!(
                "command failed: {message}"
            )));
        }
    };

    let mut guard = match Synchronizer::upgrade(guard, env.lock_timeout) {
        Upgrade::Acquired(guard) => guard,
        Upgrade::TimedOut(guard) => {
            drop(guard);
            return Err(CoreError::lock_timeout("write", env.lock_timeout));
        }
    };

    let id = append_entry(env, command, created)?;
    guard.model = next;
    guard.revision = id.as_u64();
    Ok(output)
}

/// Runs `execute`, converting a panic into an unexpected failure so it
/// flows through the same recovery path.
fn run_execute<M, C>(command: &C, model: &mut M, ctx: &Context) -> Result<C::Output, CommandError>
where
    M: Model,
    C: Command<M>,
{
    match catch_unwind(AssertUnwindSafe(|| command.execute(model, ctx))) {
        Ok(result) => result,
        Err(panic) => Err(CommandError::failed(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("command panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("command panicked: {s}")
    } else {
        "command panicked".to_string()
    }
}

fn abort_error(e: CommandError, phase: &str) -> CoreError {
    match e {
        CommandError::Abort(reason) => CoreError::Aborted { reason },
        CommandError::Failed(message) => CoreError::aborted(format!(
            "command failed during {phase}: {message}"
        )),
    }
}

fn append_entry<M, C>(
    env: &KernelEnv<'_, M, C>,
    command: &C,
    created: u64,
) -> CoreResult<EntryId>
where
    M: Model,
    C: Command<M>,
{
    env.journal
        .append(command, created)
        .map_err(|e| fatal(env, format!("journal append failed: {e}")))
}

fn void_last_entry<M, C>(env: &KernelEnv<'_, M, C>) -> CoreResult<()>
where
    M: Model,
    C: Command<M>,
{
    env.journal
        .write_rollback_marker()
        .map_err(|e| fatal(env, format!("rollback marker write failed: {e}")))
}

/// Discards the in-memory model and reloads it from snapshot + replay.
fn rebuild<M, C>(env: &KernelEnv<'_, M, C>, guard: &mut WriteGuard<'_, EngineState<M>>) -> CoreResult<()>
where
    M: Model,
    C: Command<M>,
{
    tracing::warn!("discarding model, rebuilding from snapshot + journal");
    let loader = ModelLoader::new(env.journal, env.snapshots, env.codec);
    match loader.load_model::<M>() {
        Ok((model, revision)) => {
            guard.model = model;
            guard.revision = revision;
            Ok(())
        }
        Err(e) => Err(fatal(env, format!("model rebuild failed: {e}"))),
    }
}

/// Marks the engine unusable and returns the fatal error.
fn fatal<M, C>(env: &KernelEnv<'_, M, C>, message: impl Into<String>) -> CoreError
where
    M: Model,
    C: Command<M>,
{
    let message = message.into();
    env.closed.store(true, Ordering::SeqCst);
    tracing::error!(%message, "engine closed after fatal failure");
    CoreError::fatal(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_formats() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "command panicked: boom");

        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom".to_string());
        assert_eq!(panic_message(boxed.as_ref()), "command panicked: boom");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(17u8);
        assert_eq!(panic_message(boxed.as_ref()), "command panicked");
    }

    #[test]
    fn abort_maps_unchanged_failed_is_wrapped() {
        let abort = abort_error(CommandError::abort("declined"), "prepare");
        assert!(matches!(abort, CoreError::Aborted { reason } if reason == "declined"));

        let failed = abort_error(CommandError::failed("oops"), "prepare");
        assert!(
            matches!(failed, CoreError::Aborted { reason } if reason.contains("during prepare"))
        );
    }
}
