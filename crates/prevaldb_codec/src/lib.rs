//! # PrevalDB Codec
//!
//! CBOR encoding/decoding for PrevalDB.
//!
//! The codec is the single serialization boundary of the engine. The
//! same encoding is used for:
//! - Snapshot persistence (the whole model graph)
//! - Journal entry payloads (individual commands)
//! - Deep-cloning values that cross the engine's trust boundary
//!
//! ## Framing
//!
//! Byte streams may optionally be wrapped in a self-describing packet:
//!
//! ```text
//! | flags (1) | length (4) | payload (N) | [crc_len (4) | crc (4)] |
//! ```
//!
//! The flags byte advertises checksum, compression, and encryption
//! bits. This build implements the checksum bit (CRC32 trailer);
//! compressed or encrypted packets are rejected as unsupported.
//!
//! ## Type remapping
//!
//! Stored type identifiers (recorded in journal creation markers and
//! snapshot headers) can be remapped through a [`TypeMap`] when types
//! are renamed or moved, without rewriting history.
//!
//! ## Usage
//!
//! ```
//! use prevaldb_codec::Codec;
//!
//! let codec = Codec::new();
//! let bytes = codec.encode(&vec![1u64, 2, 3]).unwrap();
//! let back: Vec<u64> = codec.decode(&bytes).unwrap();
//! assert_eq!(back, vec![1, 2, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod framing;
mod type_map;

pub use codec::Codec;
pub use error::{CodecError, CodecResult};
pub use framing::{compute_crc32, decode_framed, encode_framed, FrameFlags};
pub use type_map::TypeMap;
