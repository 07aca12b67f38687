//! # PrevalDB Storage
//!
//! Storage backend trait and implementations for PrevalDB.
//!
//! This crate provides the lowest-level storage abstraction for the
//! engine. Storage backends are **opaque byte stores**: they do not
//! interpret the data they hold. Journal entry framing, snapshot
//! headers, and checksums are all owned by the layers above.
//!
//! ## Design Principles
//!
//! - Backends are simple byte stores (read, append, flush)
//! - No knowledge of journal entries, segments, or snapshots
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral engines
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use prevaldb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
