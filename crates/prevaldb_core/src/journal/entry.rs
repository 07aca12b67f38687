//! Journal entry types and envelope serialization.

use crate::error::{CoreError, CoreResult};
use crate::types::{EntryId, Timestamp};
use prevaldb_codec::compute_crc32;

/// Magic bytes identifying a journal entry.
pub(crate) const ENTRY_MAGIC: [u8; 4] = *b"PVLJ";

/// Current journal entry format version.
pub(crate) const ENTRY_VERSION: u16 = 1;

/// Envelope header size.
/// magic (4) + version (2) + kind (1) + length (4) = 11 bytes
pub(crate) const HEADER_SIZE: usize = 11;

/// CRC trailer size.
pub(crate) const CRC_SIZE: usize = 4;

/// Kind of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    /// A journaled command.
    Command = 1,
    /// A marker voiding the command entry immediately before it.
    Rollback = 2,
    /// Type-only initial creation marker, first entry of a fresh store.
    ModelCreated = 3,
}

impl EntryKind {
    /// Converts a byte to an entry kind.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Command),
            2 => Some(Self::Rollback),
            3 => Some(Self::ModelCreated),
            _ => None,
        }
    }

    /// Converts the entry kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A journal entry: id, creation timestamp, and payload.
///
/// Entries are write-once and immutable after creation. `T` is
/// [`EntryRecord`] at the storage layer and the decoded command type in
/// the committed replay stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry<T> {
    /// Entry id, assigned at append time.
    pub id: EntryId,
    /// Wall-clock time at append, authoritative on replay.
    pub created: Timestamp,
    /// The entry payload.
    pub item: T,
}

/// Decoded payload of a journal entry.
///
/// Command payloads stay as codec bytes here; the journal decodes them
/// into the application's command type once the committed stream is
/// established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRecord {
    /// A journaled command (codec bytes).
    Command {
        /// Encoded command payload.
        bytes: Vec<u8>,
    },
    /// Voids the command entry with the given id.
    Rollback {
        /// Id of the command entry that must be treated as if it never
        /// happened.
        command_id: EntryId,
    },
    /// Records the model type a fresh store was created for.
    ModelCreated {
        /// Type identifier of the model.
        type_id: String,
    },
}

impl EntryRecord {
    /// Returns the entry kind.
    #[must_use]
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Command { .. } => EntryKind::Command,
            Self::Rollback { .. } => EntryKind::Rollback,
            Self::ModelCreated { .. } => EntryKind::ModelCreated,
        }
    }
}

/// Encodes a complete entry frame (envelope + payload + CRC).
///
/// # Errors
///
/// Returns an error if the payload exceeds the u32 length field.
pub fn encode_frame(record: &EntryRecord, id: EntryId, created: Timestamp) -> CoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&id.as_u64().to_le_bytes());
    payload.extend_from_slice(&created.to_le_bytes());

    match record {
        EntryRecord::Command { bytes } => {
            payload.extend_from_slice(bytes);
        }
        EntryRecord::Rollback { command_id } => {
            payload.extend_from_slice(&command_id.as_u64().to_le_bytes());
        }
        EntryRecord::ModelCreated { type_id } => {
            let len = u32::try_from(type_id.len())
                .map_err(|_| CoreError::invalid_operation("type identifier too long"))?;
            payload.extend_from_slice(&len.to_le_bytes());
            payload.extend_from_slice(type_id.as_bytes());
        }
    }

    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::invalid_operation("journal entry payload too large"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&ENTRY_MAGIC);
    frame.extend_from_slice(&ENTRY_VERSION.to_le_bytes());
    frame.push(record.kind().as_byte());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);

    // CRC over everything before it
    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());

    Ok(frame)
}

/// Decodes a complete entry frame.
///
/// The frame must be exactly one entry; trailing bytes are corruption.
///
/// # Errors
///
/// Returns an error on bad magic, unsupported version, unknown kind,
/// CRC mismatch, or a malformed payload.
pub fn decode_frame(frame: &[u8]) -> CoreResult<JournalEntry<EntryRecord>> {
    if frame.len() < HEADER_SIZE + CRC_SIZE {
        return Err(CoreError::journal_corruption("entry frame too short"));
    }

    if frame[0..4] != ENTRY_MAGIC {
        return Err(CoreError::journal_corruption("invalid entry magic"));
    }

    let version = u16::from_le_bytes([frame[4], frame[5]]);
    if version > ENTRY_VERSION {
        return Err(CoreError::journal_corruption(format!(
            "unsupported entry version {version}"
        )));
    }

    let kind = EntryKind::from_byte(frame[6])
        .ok_or_else(|| CoreError::journal_corruption(format!("unknown entry kind {}", frame[6])))?;

    let payload_len = u32::from_le_bytes([frame[7], frame[8], frame[9], frame[10]]) as usize;
    let expected_len = HEADER_SIZE + payload_len + CRC_SIZE;
    if frame.len() != expected_len {
        return Err(CoreError::journal_corruption(format!(
            "entry frame length mismatch: expected {expected_len} bytes, got {}",
            frame.len()
        )));
    }

    let payload_end = HEADER_SIZE + payload_len;
    let stored_crc = u32::from_le_bytes([
        frame[payload_end],
        frame[payload_end + 1],
        frame[payload_end + 2],
        frame[payload_end + 3],
    ]);
    let computed_crc = compute_crc32(&frame[..payload_end]);
    if stored_crc != computed_crc {
        return Err(CoreError::journal_corruption(format!(
            "entry checksum mismatch: expected {stored_crc:08x}, got {computed_crc:08x}"
        )));
    }

    decode_payload(kind, &frame[HEADER_SIZE..payload_end])
}

fn decode_payload(kind: EntryKind, payload: &[u8]) -> CoreResult<JournalEntry<EntryRecord>> {
    let mut cursor = 0usize;

    let read_u64 = |cursor: &mut usize| -> CoreResult<u64> {
        if *cursor + 8 > payload.len() {
            return Err(CoreError::journal_corruption("unexpected end of payload"));
        }
        let bytes: [u8; 8] = payload[*cursor..*cursor + 8]
            .try_into()
            .map_err(|_| CoreError::journal_corruption("invalid u64"))?;
        *cursor += 8;
        Ok(u64::from_le_bytes(bytes))
    };

    let read_u32 = |cursor: &mut usize| -> CoreResult<u32> {
        if *cursor + 4 > payload.len() {
            return Err(CoreError::journal_corruption("unexpected end of payload"));
        }
        let bytes: [u8; 4] = payload[*cursor..*cursor + 4]
            .try_into()
            .map_err(|_| CoreError::journal_corruption("invalid u32"))?;
        *cursor += 4;
        Ok(u32::from_le_bytes(bytes))
    };

    let id = EntryId::new(read_u64(&mut cursor)?);
    let created = read_u64(&mut cursor)?;

    let item = match kind {
        EntryKind::Command => EntryRecord::Command {
            bytes: payload[cursor..].to_vec(),
        },
        EntryKind::Rollback => {
            let command_id = EntryId::new(read_u64(&mut cursor)?);
            if cursor != payload.len() {
                return Err(CoreError::journal_corruption(
                    "trailing bytes in rollback marker",
                ));
            }
            EntryRecord::Rollback { command_id }
        }
        EntryKind::ModelCreated => {
            let len = read_u32(&mut cursor)? as usize;
            if cursor + len != payload.len() {
                return Err(CoreError::journal_corruption(
                    "type identifier length mismatch",
                ));
            }
            let type_id = std::str::from_utf8(&payload[cursor..cursor + len])
                .map_err(|_| CoreError::journal_corruption("type identifier is not UTF-8"))?
                .to_string();
            EntryRecord::ModelCreated { type_id }
        }
    };

    Ok(JournalEntry { id, created, item })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_kind_roundtrip() {
        for kind in [EntryKind::Command, EntryKind::Rollback, EntryKind::ModelCreated] {
            assert_eq!(EntryKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(EntryKind::from_byte(0), None);
        assert_eq!(EntryKind::from_byte(9), None);
    }

    #[test]
    fn command_frame_roundtrip() {
        let record = EntryRecord::Command {
            bytes: vec![0xCA, 0xFE, 0xBA, 0xBE],
        };
        let frame = encode_frame(&record, EntryId::new(7), 1234).unwrap();
        let entry = decode_frame(&frame).unwrap();

        assert_eq!(entry.id, EntryId::new(7));
        assert_eq!(entry.created, 1234);
        assert_eq!(entry.item, record);
    }

    #[test]
    fn rollback_frame_roundtrip() {
        let record = EntryRecord::Rollback {
            command_id: EntryId::new(4),
        };
        let frame = encode_frame(&record, EntryId::new(4), 99).unwrap();
        let entry = decode_frame(&frame).unwrap();

        assert_eq!(entry.id, EntryId::new(4));
        assert_eq!(entry.item, record);
    }

    #[test]
    fn model_created_frame_roundtrip() {
        let record = EntryRecord::ModelCreated {
            type_id: "ledger::Ledger".to_string(),
        };
        let frame = encode_frame(&record, EntryId::new(0), 1).unwrap();
        let entry = decode_frame(&frame).unwrap();

        assert_eq!(entry.id, EntryId::new(0));
        assert_eq!(entry.item, record);
    }

    #[test]
    fn empty_command_payload_roundtrip() {
        let record = EntryRecord::Command { bytes: Vec::new() };
        let frame = encode_frame(&record, EntryId::new(1), 0).unwrap();
        let entry = decode_frame(&frame).unwrap();
        assert_eq!(entry.item, record);
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let record = EntryRecord::Command {
            bytes: vec![1, 2, 3],
        };
        let mut frame = encode_frame(&record, EntryId::new(1), 0).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        let result = decode_frame(&frame);
        assert!(matches!(result, Err(CoreError::JournalCorruption { .. })));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let record = EntryRecord::Command {
            bytes: vec![1, 2, 3],
        };
        let mut frame = encode_frame(&record, EntryId::new(1), 0).unwrap();
        frame[0] = b'X';

        let result = decode_frame(&frame);
        assert!(matches!(result, Err(CoreError::JournalCorruption { .. })));
    }

    #[test]
    fn future_version_is_rejected() {
        let record = EntryRecord::Command { bytes: vec![] };
        let mut frame = encode_frame(&record, EntryId::new(1), 0).unwrap();
        frame[4] = 0xFF;
        frame[5] = 0xFF;

        let result = decode_frame(&frame);
        assert!(matches!(result, Err(CoreError::JournalCorruption { .. })));
    }
}
