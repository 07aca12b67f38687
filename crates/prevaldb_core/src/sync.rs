//! Model access synchronization.
//!
//! The synchronizer owns the model cell and grants timed read, upgrade,
//! and write access according to a pluggable policy. Lock acquisition
//! is the engine's only suspension point: every entry call takes a
//! timeout and fails with [`CoreError::LockTimeout`] instead of
//! blocking forever. Access is released by dropping the guard.

use crate::error::{CoreError, CoreResult};
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// Synchronization policy for a model cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Multiple concurrent readers XOR one writer, with an upgradable
    /// read mode for the prepare phase.
    #[default]
    ReadWrite,
    /// One thread at a time for any access.
    Exclusive,
    /// No synchronization: the deployment guarantees single-threaded
    /// access (or the immutability kernel makes locking unnecessary).
    /// Acquisition is non-blocking; contention surfaces as an immediate
    /// timeout error rather than undefined behavior.
    None,
}

/// Grants timed access to the value it owns.
pub struct Synchronizer<T> {
    policy: SyncPolicy,
    cell: RwLock<T>,
}

enum ReadInner<'a, T> {
    Shared(RwLockReadGuard<'a, T>),
    Exclusive(RwLockWriteGuard<'a, T>),
}

/// Shared read access to the synchronized value.
pub struct ReadGuard<'a, T>(ReadInner<'a, T>);

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.0 {
            ReadInner::Shared(g) => g,
            ReadInner::Exclusive(g) => g,
        }
    }
}

enum UpgradeInner<'a, T> {
    Upgradable(RwLockUpgradableReadGuard<'a, T>),
    Exclusive(RwLockWriteGuard<'a, T>),
}

/// Read access that can later be promoted to write access.
///
/// At most one upgrade guard exists at a time, which is what serializes
/// command execution while still admitting concurrent readers during
/// the prepare phase.
pub struct UpgradeGuard<'a, T>(UpgradeInner<'a, T>);

impl<T> Deref for UpgradeGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.0 {
            UpgradeInner::Upgradable(g) => g,
            UpgradeInner::Exclusive(g) => g,
        }
    }
}

/// Exclusive write access to the synchronized value.
pub struct WriteGuard<'a, T>(RwLockWriteGuard<'a, T>);

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// Outcome of promoting an upgrade guard to a write guard.
pub enum Upgrade<'a, T> {
    /// The write lock was acquired.
    Acquired(WriteGuard<'a, T>),
    /// The timeout elapsed; the original guard is handed back so the
    /// caller still holds its upgradable access.
    TimedOut(UpgradeGuard<'a, T>),
}

impl<T> Synchronizer<T> {
    /// Creates a synchronizer owning `value` under the given policy.
    pub fn new(policy: SyncPolicy, value: T) -> Self {
        Self {
            policy,
            cell: RwLock::new(value),
        }
    }

    /// Returns the active policy.
    #[must_use]
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Enters read mode.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] if access was not granted
    /// within `timeout`.
    pub fn enter_read(&self, timeout: Duration) -> CoreResult<ReadGuard<'_, T>> {
        let inner = match self.policy {
            SyncPolicy::ReadWrite => self.cell.try_read_for(timeout).map(ReadInner::Shared),
            SyncPolicy::Exclusive => self.cell.try_write_for(timeout).map(ReadInner::Exclusive),
            SyncPolicy::None => self.cell.try_read().map(ReadInner::Shared),
        };
        inner
            .map(ReadGuard)
            .ok_or(CoreError::lock_timeout("read", timeout))
    }

    /// Enters upgradable read mode.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] if access was not granted
    /// within `timeout`.
    pub fn enter_upgrade(&self, timeout: Duration) -> CoreResult<UpgradeGuard<'_, T>> {
        let inner = match self.policy {
            SyncPolicy::ReadWrite => self
                .cell
                .try_upgradable_read_for(timeout)
                .map(UpgradeInner::Upgradable),
            SyncPolicy::Exclusive => self.cell.try_write_for(timeout).map(UpgradeInner::Exclusive),
            SyncPolicy::None => self.cell.try_write().map(UpgradeInner::Exclusive),
        };
        inner
            .map(UpgradeGuard)
            .ok_or(CoreError::lock_timeout("upgrade", timeout))
    }

    /// Enters write mode directly.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] if access was not granted
    /// within `timeout`.
    pub fn enter_write(&self, timeout: Duration) -> CoreResult<WriteGuard<'_, T>> {
        let inner = match self.policy {
            SyncPolicy::ReadWrite | SyncPolicy::Exclusive => self.cell.try_write_for(timeout),
            SyncPolicy::None => self.cell.try_write(),
        };
        inner
            .map(WriteGuard)
            .ok_or(CoreError::lock_timeout("write", timeout))
    }

    /// Promotes an upgrade guard to a write guard.
    ///
    /// On timeout the original guard is returned inside
    /// [`Upgrade::TimedOut`], so the caller keeps its upgradable access
    /// and can compensate (e.g. void an already-journaled entry) before
    /// releasing.
    pub fn upgrade<'a>(guard: UpgradeGuard<'a, T>, timeout: Duration) -> Upgrade<'a, T> {
        match guard.0 {
            UpgradeInner::Upgradable(g) => {
                match RwLockUpgradableReadGuard::try_upgrade_for(g, timeout) {
                    Ok(write) => Upgrade::Acquired(WriteGuard(write)),
                    Err(original) => Upgrade::TimedOut(UpgradeGuard(UpgradeInner::Upgradable(original))),
                }
            }
            UpgradeInner::Exclusive(g) => Upgrade::Acquired(WriteGuard(g)),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Synchronizer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
