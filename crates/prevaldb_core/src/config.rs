//! Engine configuration.

use crate::isolation::CloneStrategy;
use crate::kernel::KernelStrategy;
use crate::store::RolloverStrategy;
use crate::sync::SyncPolicy;
use prevaldb_codec::TypeMap;
use std::time::Duration;

/// Configuration for opening an engine.
///
/// All policy choices are per-engine values carried here; the engine
/// keeps no process-wide mutable state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Transaction execution strategy.
    pub kernel: KernelStrategy,

    /// How model access is synchronized.
    pub synchronization: SyncPolicy,

    /// When values crossing the engine boundary are deep-copied.
    pub isolation: CloneStrategy,

    /// Budget for each lock acquisition before the operation fails
    /// with a timeout.
    pub lock_timeout: Duration,

    /// Whether to flush the journal after every append (safer but
    /// slower).
    pub flush_on_append: bool,

    /// When journal segments are sealed.
    pub rollover: RolloverStrategy,

    /// Whether snapshot payloads carry a checksum trailer.
    pub snapshot_checksums: bool,

    /// Stored-type-identifier substitutions applied when opening
    /// existing stores.
    pub type_map: TypeMap,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kernel: KernelStrategy::Optimistic,
            synchronization: SyncPolicy::ReadWrite,
            isolation: CloneStrategy::default(),
            lock_timeout: Duration::from_secs(10),
            flush_on_append: true,
            rollover: RolloverStrategy::default(),
            snapshot_checksums: true,
            type_map: TypeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the kernel strategy.
    #[must_use]
    pub fn kernel(mut self, kernel: KernelStrategy) -> Self {
        self.kernel = kernel;
        self
    }

    /// Sets the synchronization policy.
    #[must_use]
    pub fn synchronization(mut self, policy: SyncPolicy) -> Self {
        self.synchronization = policy;
        self
    }

    /// Sets the clone strategy.
    #[must_use]
    pub fn isolation(mut self, strategy: CloneStrategy) -> Self {
        self.isolation = strategy;
        self
    }

    /// Sets the lock acquisition budget.
    #[must_use]
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets whether the journal is flushed after every append.
    #[must_use]
    pub fn flush_on_append(mut self, value: bool) -> Self {
        self.flush_on_append = value;
        self
    }

    /// Sets the segment rollover strategy.
    #[must_use]
    pub fn rollover(mut self, strategy: RolloverStrategy) -> Self {
        self.rollover = strategy;
        self
    }

    /// Sets whether snapshot payloads carry a checksum trailer.
    #[must_use]
    pub fn snapshot_checksums(mut self, value: bool) -> Self {
        self.snapshot_checksums = value;
        self
    }

    /// Sets the type-identifier substitution map.
    #[must_use]
    pub fn type_map(mut self, type_map: TypeMap) -> Self {
        self.type_map = type_map;
        self
    }
}
