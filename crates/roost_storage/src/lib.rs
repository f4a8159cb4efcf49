//! # Roost Storage
//!
//! Single-file ordered key-value engine for the Roost document store.
//!
//! The engine provides:
//!
//! - nested named namespaces ("buckets") holding byte-string keys in
//!   lexicographic order;
//! - forward/backward cursors with seek;
//! - one writer / many readers isolation: readers see an immutable
//!   snapshot as of transaction start and never block the writer;
//! - durability on commit: the whole store is written to a temp file,
//!   synced, and atomically renamed over the live file;
//! - an OS-level exclusive lock so only one process opens the file for
//!   writing at a time, with a bounded acquire wait.
//!
//! Buckets are auto-vivified on first write and read as empty when
//! absent. The engine stores opaque bytes; record interpretation belongs
//! to the layers above.
//!
//! ## Example
//!
//! ```rust
//! use roost_storage::{Database, StorageError};
//!
//! let db = Database::memory();
//! db.update::<_, StorageError>(|tx| {
//!     tx.bucket(&["Data", "User"]).put(b"0000000001", b"{}")
//! }).unwrap();
//! let found = db.select::<_, StorageError>(|tx| {
//!     Ok(tx.bucket(&["Data", "User"]).get(b"0000000001"))
//! }).unwrap();
//! assert_eq!(found.as_deref(), Some(b"{}".as_slice()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod db;
mod error;
mod file;
mod snapshot;

pub use db::{Bucket, Cursor, Database, Transaction};
pub use error::{StorageError, StorageResult};
