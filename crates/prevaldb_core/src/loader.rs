//! Model recovery from snapshot + journal replay.

use crate::command::{Command, Context};
use crate::error::{CoreError, CoreResult};
use crate::journal::CommandJournal;
use crate::model::Model;
use crate::snapshot::{SnapshotHeader, SnapshotMeta, SnapshotStore};
use prevaldb_codec::{Codec, FrameFlags};
use std::any::type_name;

/// Rebuilds a model from the newest snapshot plus journal replay.
///
/// Recovery runs once at engine startup and again whenever a kernel
/// strategy discards a possibly-corrupted model. It only ever reads
/// the snapshot store.
pub struct ModelLoader<'a, C> {
    journal: &'a CommandJournal<C>,
    snapshots: &'a dyn SnapshotStore,
    codec: &'a Codec,
}

impl<'a, C> ModelLoader<'a, C> {
    /// Creates a loader over the given journal and snapshot store.
    pub fn new(
        journal: &'a CommandJournal<C>,
        snapshots: &'a dyn SnapshotStore,
        codec: &'a Codec,
    ) -> Self {
        Self {
            journal,
            snapshots,
            codec,
        }
    }

    /// Loads the model and its revision.
    ///
    /// The newest snapshot is decoded (or a fresh model constructed if
    /// none exists), the post-snapshot hook runs, every committed
    /// command entry with id greater than the snapshot revision is
    /// re-executed in order with its persisted timestamp, and the
    /// post-journal hook runs.
    ///
    /// # Errors
    ///
    /// Returns an error if stores cannot be read, the stored model type
    /// does not match `M` after remapping, or a committed entry fails
    /// to re-execute.
    pub fn load_model<M>(&self) -> CoreResult<(M, u64)>
    where
        M: Model,
        C: Command<M>,
    {
        let snapshots = self.snapshots.list_snapshots()?;

        let (mut model, mut revision) = match snapshots.last() {
            Some(meta) => {
                let bytes = self.snapshots.load_snapshot(meta)?;
                let mut model = self.decode_snapshot::<M>(&bytes, meta)?;
                model.snapshot_restored();
                tracing::debug!(revision = meta.revision, "model restored from snapshot");
                (model, meta.revision)
            }
            None => {
                if let Some(stored) = self.journal.model_type()? {
                    let mapped = self.codec.type_map().remap(&stored);
                    if mapped != type_name::<M>() {
                        return Err(CoreError::invalid_format(format!(
                            "store was created for model type {stored}, engine expects {}",
                            type_name::<M>()
                        )));
                    }
                }
                (M::default(), 0)
            }
        };

        let mut replayed = 0u64;
        for entry in self.journal.committed_entries(revision)? {
            let entry = entry?;
            let ctx = Context {
                timestamp: entry.created,
            };
            entry
                .item
                .execute(&mut model, &ctx)
                .map_err(|e| CoreError::ReplayFailed {
                    id: entry.id.as_u64(),
                    reason: e.to_string(),
                })?;
            revision = entry.id.as_u64();
            replayed += 1;
        }

        model.journal_restored();
        tracing::debug!(revision, replayed, "journal replay complete");
        Ok((model, revision))
    }

    fn decode_snapshot<M: Model>(&self, bytes: &[u8], meta: &SnapshotMeta) -> CoreResult<M> {
        let (header, rest) = SnapshotHeader::decode(bytes)?;

        if header.revision != meta.revision {
            return Err(CoreError::snapshot_corruption(format!(
                "snapshot header revision {} disagrees with store metadata {}",
                header.revision, meta.revision
            )));
        }

        let mapped = self.codec.type_map().remap(&header.type_id);
        if mapped != type_name::<M>() {
            return Err(CoreError::invalid_format(format!(
                "snapshot holds model type {}, engine expects {}",
                header.type_id,
                type_name::<M>()
            )));
        }

        let payload = prevaldb_codec::decode_framed(rest)?;
        Ok(self.codec.decode(payload)?)
    }
}

/// Encodes a model into snapshot bytes (header + framed payload).
pub(crate) fn encode_snapshot_bytes<M: Model>(
    codec: &Codec,
    model: &M,
    meta: &SnapshotMeta,
    checksums: bool,
) -> CoreResult<Vec<u8>> {
    let header = SnapshotHeader {
        created: meta.created,
        revision: meta.revision,
        type_id: type_name::<M>().to_string(),
    };

    let flags = if checksums {
        FrameFlags::CHECKSUM
    } else {
        FrameFlags::empty()
    };

    let payload = codec.encode(model)?;
    let mut bytes = header.encode();
    bytes.extend_from_slice(&prevaldb_codec::encode_framed(&payload, flags)?);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::CommandJournal;
    use crate::snapshot::InMemorySnapshotStore;
    use crate::store::{InMemoryCommandStore, RolloverStrategy};
    use crate::testing::{deposit, open, withdraw, Ledger, LedgerCommand};
    use crate::types::now_millis;
    use std::sync::Arc;

    struct Fixture {
        journal: CommandJournal<LedgerCommand>,
        snapshots: InMemorySnapshotStore,
        codec: Arc<Codec>,
    }

    impl Fixture {
        fn new() -> Self {
            let codec = Arc::new(Codec::new());
            let store = Arc::new(InMemoryCommandStore::new(RolloverStrategy::Never));
            Self {
                journal: CommandJournal::open(store, Arc::clone(&codec)).unwrap(),
                snapshots: InMemorySnapshotStore::new(),
                codec,
            }
        }

        fn with_type_map(type_map: prevaldb_codec::TypeMap) -> Self {
            let codec = Arc::new(Codec::with_type_map(type_map));
            let store = Arc::new(InMemoryCommandStore::new(RolloverStrategy::Never));
            Self {
                journal: CommandJournal::open(store, Arc::clone(&codec)).unwrap(),
                snapshots: InMemorySnapshotStore::new(),
                codec,
            }
        }

        fn load(&self) -> CoreResult<(Ledger, u64)> {
            ModelLoader::new(&self.journal, &self.snapshots, &self.codec).load_model()
        }

        fn snapshot_current(&self) {
            let (model, revision) = self.load().unwrap();
            let meta = SnapshotMeta {
                revision,
                created: now_millis(),
            };
            let bytes = encode_snapshot_bytes(&self.codec, &model, &meta, true).unwrap();
            self.snapshots.write_snapshot(&meta, &bytes).unwrap();
        }
    }

    #[test]
    fn fresh_store_yields_default_model() {
        let fixture = Fixture::new();
        let (model, revision) = fixture.load().unwrap();

        assert_eq!(revision, 0);
        assert!(model.accounts.is_empty());
        assert!(model.hooks.journal_restored);
        assert!(!model.hooks.snapshot_restored);
    }

    #[test]
    fn replay_from_empty_applies_all_committed() {
        let fixture = Fixture::new();
        fixture.journal.append(&open("alice"), 1).unwrap();
        fixture.journal.append(&deposit("alice", 100), 2).unwrap();
        fixture.journal.append(&withdraw("alice", 30), 3).unwrap();

        let (model, revision) = fixture.load().unwrap();
        assert_eq!(revision, 3);
        assert_eq!(model.balance("alice"), 70);
    }

    #[test]
    fn replay_skips_rolled_back_entries() {
        let fixture = Fixture::new();
        fixture.journal.append(&open("alice"), 1).unwrap();
        fixture.journal.append(&deposit("alice", 100), 2).unwrap();
        fixture.journal.write_rollback_marker().unwrap();
        fixture.journal.append(&deposit("alice", 5), 3).unwrap();

        let (model, revision) = fixture.load().unwrap();
        assert_eq!(model.balance("alice"), 5);
        assert_eq!(revision, 3);
    }

    #[test]
    fn replay_uses_persisted_timestamps() {
        let fixture = Fixture::new();
        fixture.journal.append(&open("alice"), 4321).unwrap();

        let (model, _) = fixture.load().unwrap();
        assert_eq!(model.applied_at, 4321);
    }

    #[test]
    fn snapshot_then_replay_matches_full_replay() {
        let fixture = Fixture::new();
        fixture.journal.append(&open("alice"), 1).unwrap();
        fixture.journal.append(&deposit("alice", 100), 2).unwrap();

        fixture.snapshot_current();

        fixture.journal.append(&deposit("alice", 11), 3).unwrap();
        fixture.journal.append(&open("bob"), 4).unwrap();

        let (from_snapshot, revision) = fixture.load().unwrap();
        assert_eq!(revision, 4);
        assert!(from_snapshot.hooks.snapshot_restored);

        // Full replay from the empty state must serialize identically.
        let replay_only = Fixture::new();
        replay_only.journal.append(&open("alice"), 1).unwrap();
        replay_only.journal.append(&deposit("alice", 100), 2).unwrap();
        replay_only.journal.append(&deposit("alice", 11), 3).unwrap();
        replay_only.journal.append(&open("bob"), 4).unwrap();
        let (from_scratch, _) = replay_only.load().unwrap();

        let codec = Codec::new();
        assert_eq!(
            codec.encode(&from_snapshot).unwrap(),
            codec.encode(&from_scratch).unwrap()
        );
    }

    #[test]
    fn newest_snapshot_wins() {
        let fixture = Fixture::new();
        fixture.journal.append(&open("alice"), 1).unwrap();
        fixture.snapshot_current();
        fixture.journal.append(&deposit("alice", 50), 2).unwrap();
        fixture.snapshot_current();

        let (model, revision) = fixture.load().unwrap();
        assert_eq!(revision, 2);
        assert_eq!(model.balance("alice"), 50);
    }

    #[test]
    fn model_type_mismatch_is_rejected() {
        let fixture = Fixture::new();
        fixture.journal.write_model_created("some::other::Model").unwrap();

        assert!(matches!(
            fixture.load(),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn type_map_remaps_stored_model_type() {
        let mut type_map = prevaldb_codec::TypeMap::new();
        type_map.insert(
            "old_crate::Ledger",
            std::any::type_name::<Ledger>(),
        );
        let fixture = Fixture::with_type_map(type_map);
        fixture.journal.write_model_created("old_crate::Ledger").unwrap();

        assert!(fixture.load().is_ok());
    }

    #[test]
    fn matching_creation_marker_is_accepted() {
        let fixture = Fixture::new();
        fixture
            .journal
            .write_model_created(std::any::type_name::<Ledger>())
            .unwrap();
        fixture.journal.append(&open("alice"), 1).unwrap();

        let (model, revision) = fixture.load().unwrap();
        assert_eq!(revision, 1);
        assert_eq!(model.balance("alice"), 0);
    }

    #[test]
    fn corrupted_snapshot_payload_is_rejected() {
        let fixture = Fixture::new();
        fixture.journal.append(&open("alice"), 1).unwrap();
        fixture.snapshot_current();

        // Corrupt the stored payload bytes.
        let meta = fixture.snapshots.list_snapshots().unwrap()[0];
        let mut bytes = fixture.snapshots.load_snapshot(&meta).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let broken = InMemorySnapshotStore::new();
        broken.write_snapshot(&meta, &bytes).unwrap();

        let loader = ModelLoader::new(&fixture.journal, &broken, &fixture.codec);
        let result: CoreResult<(Ledger, u64)> = loader.load_model();
        assert!(result.is_err());
    }
}
