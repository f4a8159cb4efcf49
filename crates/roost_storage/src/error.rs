//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the key-value engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the exclusive file lock.
    #[error("database locked: another process has exclusive access")]
    Locked,

    /// A mutation was attempted inside a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The store file failed to parse.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}
