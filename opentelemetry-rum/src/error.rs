//! Errors surfaced by the persistence layer.
use std::sync::PoisonError;
use thiserror::Error;

/// Errors returned by a [`KeyValueStore`](crate::storage::KeyValueStore).
///
/// These never reach callers of the session or user APIs: a failed write is
/// logged and the in-memory state stays authoritative.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The backing file could not be read or written.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document could not be encoded or decoded.
    #[error("storage document is malformed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A writer panicked while holding the store lock.
    #[error("storage lock poisoned: {0}")]
    Poisoned(String),
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(err: PoisonError<T>) -> Self {
        StoreError::Poisoned(err.to_string())
    }
}
