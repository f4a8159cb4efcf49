//! Error types for the document store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// The enum is closed so callers can match exhaustively. A missing
/// record is never an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying key-value engine failure; fatal to the enclosing
    /// transaction.
    #[error("engine error: {0}")]
    Engine(#[from] roost_storage::StorageError),

    /// A record could not be serialized.
    #[error("cannot encode {entity} record: {source}")]
    Encode {
        /// Entity name.
        entity: &'static str,
        /// Serialization failure.
        source: serde_json::Error,
    },

    /// A stored record's bytes do not parse into the expected shape.
    #[error("cannot decode {entity} record: {source}")]
    Decode {
        /// Entity name.
        entity: &'static str,
        /// Deserialization failure.
        source: serde_json::Error,
    },

    /// A unique-constraint violation on save; no writes occurred.
    #[error("duplicate {entity} {field}: {value}")]
    DuplicateKey {
        /// Entity name.
        entity: &'static str,
        /// The unique field that collided.
        field: &'static str,
        /// The colliding value.
        value: String,
    },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Engine(roost_storage::StorageError::Io(err))
    }
}
