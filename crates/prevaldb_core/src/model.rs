//! The model trait.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// The aggregate root an engine manages.
///
/// Exactly one live model instance exists per engine; it is owned by
/// the kernel behind the synchronizer and mutated only inside the
/// write-lock critical section. Durability comes from the command
/// journal and snapshots, both of which serialize the model through
/// the engine codec, hence the serde bounds.
///
/// `Clone` serves two kernels: the immutability kernel clones the
/// current value before each command and swaps the root afterwards
/// (models intended for that kernel should make cloning cheap, e.g.
/// via persistent data structures), and queries under that kernel run
/// against a pinned clone. `Default` is the fresh state used when no
/// snapshot exists yet.
///
/// # Lifecycle hooks
///
/// The engine invokes the hooks at well-defined points; all default to
/// no-ops:
///
/// - [`snapshot_restored`](Model::snapshot_restored) - after the model
///   was deserialized from a snapshot, before journal replay
/// - [`journal_restored`](Model::journal_restored) - after journal
///   replay completed
/// - [`starting`](Model::starting) - after recovery, before the engine
///   accepts traffic
pub trait Model: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static {
    /// Invoked after the model was restored from a snapshot.
    fn snapshot_restored(&mut self) {}

    /// Invoked after journal replay completed.
    fn journal_restored(&mut self) {}

    /// Invoked once when the engine starts serving this model.
    fn starting(&mut self) {}
}
