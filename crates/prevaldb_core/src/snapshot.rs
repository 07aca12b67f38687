//! Snapshot persistence.
//!
//! A snapshot is a full serialized copy of the model tagged with the
//! revision it reflects. Snapshot bytes are opaque to the store; the
//! engine composes them as a header followed by a framed codec payload:
//!
//! ```text
//! | magic (4) | version (2) | created (8) | revision (8) | type_len (4) | type_id (N) | framed payload |
//! ```
//!
//! Invariant: a snapshot's revision equals the id of the last committed
//! command entry reflected in its state. Recovery only ever reads this
//! store; compaction writes new snapshots and never rewrites old ones.

use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;
use parking_lot::RwLock;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Magic bytes identifying a snapshot.
const SNAPSHOT_MAGIC: [u8; 4] = *b"PVLS";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u16 = 1;

/// File extension for snapshots.
const SNAPSHOT_EXT: &str = "snapshot";

/// Identifies one snapshot in a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMeta {
    /// Id of the last committed command entry reflected in the state.
    pub revision: u64,
    /// Wall-clock time the snapshot was taken.
    pub created: Timestamp,
}

/// Self-describing prefix of the snapshot byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Wall-clock time the snapshot was taken.
    pub created: Timestamp,
    /// Revision the snapshot reflects.
    pub revision: u64,
    /// Type identifier of the serialized model.
    pub type_id: String,
}

impl SnapshotHeader {
    /// Encodes the header.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(26 + self.type_id.len());
        out.extend_from_slice(&SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&self.created.to_le_bytes());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.extend_from_slice(&(self.type_id.len() as u32).to_le_bytes());
        out.extend_from_slice(self.type_id.as_bytes());
        out
    }

    /// Decodes a header, returning it and the remaining bytes.
    ///
    /// # Errors
    ///
    /// Returns an error on bad magic, unsupported version, or a
    /// truncated header.
    pub fn decode(bytes: &[u8]) -> CoreResult<(Self, &[u8])> {
        const FIXED: usize = 4 + 2 + 8 + 8 + 4;
        if bytes.len() < FIXED {
            return Err(CoreError::snapshot_corruption("snapshot header too short"));
        }
        if bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(CoreError::snapshot_corruption("invalid snapshot magic"));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version > SNAPSHOT_VERSION {
            return Err(CoreError::snapshot_corruption(format!(
                "unsupported snapshot version {version}"
            )));
        }

        let read_u64 = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(buf)
        };
        let created = read_u64(6);
        let revision = read_u64(14);
        let type_len = u32::from_le_bytes([bytes[22], bytes[23], bytes[24], bytes[25]]) as usize;

        if bytes.len() < FIXED + type_len {
            return Err(CoreError::snapshot_corruption(
                "snapshot type identifier truncated",
            ));
        }
        let type_id = std::str::from_utf8(&bytes[FIXED..FIXED + type_len])
            .map_err(|_| CoreError::snapshot_corruption("type identifier is not UTF-8"))?
            .to_string();

        Ok((
            Self {
                created,
                revision,
                type_id,
            },
            &bytes[FIXED + type_len..],
        ))
    }
}

/// Persists and retrieves full model snapshots.
///
/// Stores deal in opaque bytes; format interpretation belongs to the
/// engine. Implementations must return metadata from `list_snapshots`
/// in ascending revision order.
pub trait SnapshotStore: Send + Sync {
    /// Persists snapshot bytes under the given metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be persisted.
    fn write_snapshot(&self, meta: &SnapshotMeta, bytes: &[u8]) -> CoreResult<()>;

    /// Lists snapshot metadata in ascending revision order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn list_snapshots(&self) -> CoreResult<Vec<SnapshotMeta>>;

    /// Loads the bytes of the identified snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SnapshotNotFound`] if no such snapshot
    /// exists, or an I/O error if it cannot be read.
    fn load_snapshot(&self, meta: &SnapshotMeta) -> CoreResult<Vec<u8>>;
}

fn snapshot_file_name(meta: &SnapshotMeta) -> String {
    format!("{:012}.{}.{SNAPSHOT_EXT}", meta.revision, meta.created)
}

fn parse_snapshot_name(name: &str) -> Option<SnapshotMeta> {
    let mut parts = name.split('.');
    let revision = parts.next()?.parse().ok()?;
    let created = parts.next()?.parse().ok()?;
    if parts.next()? != SNAPSHOT_EXT || parts.next().is_some() {
        return None;
    }
    Some(SnapshotMeta { revision, created })
}

/// Snapshot store writing one file per snapshot.
///
/// Files are written to a temporary name and renamed into place, so a
/// crash mid-write never leaves a half-visible snapshot.
#[derive(Debug)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Opens a store over the given directory, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> CoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn write_snapshot(&self, meta: &SnapshotMeta, bytes: &[u8]) -> CoreResult<()> {
        let path = self.dir.join(snapshot_file_name(meta));
        let tmp = path.with_extension("tmp");

        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(snapshot = %path.display(), revision = meta.revision, "snapshot written");
        Ok(())
    }

    fn list_snapshots(&self) -> CoreResult<Vec<SnapshotMeta>> {
        let mut snapshots = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(meta) = parse_snapshot_name(name) {
                snapshots.push(meta);
            }
        }
        snapshots.sort_by_key(|m| (m.revision, m.created));
        Ok(snapshots)
    }

    fn load_snapshot(&self, meta: &SnapshotMeta) -> CoreResult<Vec<u8>> {
        let path = self.dir.join(snapshot_file_name(meta));
        if !path.exists() {
            return Err(CoreError::SnapshotNotFound {
                revision: meta.revision,
            });
        }
        Ok(std::fs::read(path)?)
    }
}

/// In-memory snapshot store for testing.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<Vec<(SnapshotMeta, Vec<u8>)>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn write_snapshot(&self, meta: &SnapshotMeta, bytes: &[u8]) -> CoreResult<()> {
        let mut snapshots = self.snapshots.write();
        snapshots.push((*meta, bytes.to_vec()));
        snapshots.sort_by_key(|(m, _)| (m.revision, m.created));
        Ok(())
    }

    fn list_snapshots(&self) -> CoreResult<Vec<SnapshotMeta>> {
        Ok(self.snapshots.read().iter().map(|(m, _)| *m).collect())
    }

    fn load_snapshot(&self, meta: &SnapshotMeta) -> CoreResult<Vec<u8>> {
        self.snapshots
            .read()
            .iter()
            .find(|(m, _)| m == meta)
            .map(|(_, bytes)| bytes.clone())
            .ok_or(CoreError::SnapshotNotFound {
                revision: meta.revision,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn meta(revision: u64, created: u64) -> SnapshotMeta {
        SnapshotMeta { revision, created }
    }

    #[test]
    fn header_roundtrip() {
        let header = SnapshotHeader {
            created: 1234,
            revision: 42,
            type_id: "ledger::Ledger".to_string(),
        };

        let mut bytes = header.encode();
        bytes.extend_from_slice(b"payload");

        let (decoded, rest) = SnapshotHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(rest, b"payload");
    }

    #[test]
    fn header_rejects_bad_magic() {
        let header = SnapshotHeader {
            created: 1,
            revision: 1,
            type_id: "t".to_string(),
        };
        let mut bytes = header.encode();
        bytes[0] = b'X';

        assert!(matches!(
            SnapshotHeader::decode(&bytes),
            Err(CoreError::SnapshotCorruption { .. })
        ));
    }

    #[test]
    fn header_rejects_truncation() {
        let header = SnapshotHeader {
            created: 1,
            revision: 1,
            type_id: "some::long::Type".to_string(),
        };
        let bytes = header.encode();

        assert!(SnapshotHeader::decode(&bytes[..10]).is_err());
        assert!(SnapshotHeader::decode(&bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();

        store.write_snapshot(&meta(5, 100), b"five").unwrap();
        store.write_snapshot(&meta(9, 200), b"nine").unwrap();

        let listed = store.list_snapshots().unwrap();
        assert_eq!(listed, vec![meta(5, 100), meta(9, 200)]);

        assert_eq!(store.load_snapshot(&meta(9, 200)).unwrap(), b"nine");
    }

    #[test]
    fn file_store_lists_in_revision_order() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();

        store.write_snapshot(&meta(20, 3), b"b").unwrap();
        store.write_snapshot(&meta(3, 1), b"a").unwrap();
        store.write_snapshot(&meta(100, 7), b"c").unwrap();

        let revisions: Vec<_> = store
            .list_snapshots()
            .unwrap()
            .iter()
            .map(|m| m.revision)
            .collect();
        assert_eq!(revisions, vec![3, 20, 100]);
    }

    #[test]
    fn file_store_missing_snapshot() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();

        assert!(matches!(
            store.load_snapshot(&meta(1, 1)),
            Err(CoreError::SnapshotNotFound { revision: 1 })
        ));
    }

    #[test]
    fn file_store_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("000000000001.tmp"), b"y").unwrap();

        assert!(store.list_snapshots().unwrap().is_empty());
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = InMemorySnapshotStore::new();
        store.write_snapshot(&meta(7, 1), b"seven").unwrap();

        assert_eq!(store.list_snapshots().unwrap(), vec![meta(7, 1)]);
        assert_eq!(store.load_snapshot(&meta(7, 1)).unwrap(), b"seven");
        assert!(store.load_snapshot(&meta(8, 1)).is_err());
    }
}
