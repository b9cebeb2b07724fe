//! Error types for storage operations.

use thiserror::Error;

use crate::memory::BackendOp;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQLite engine reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A write would create a second row with an existing primary key.
    #[error("duplicate key in {table}: {key}")]
    DuplicateKey {
        /// The table the write targeted.
        table: &'static str,
        /// Display form of the conflicting key.
        key: String,
    },

    /// A stored row could not be interpreted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A failure injected through [`crate::InMemoryBackend::fail_after`].
    #[error("injected failure in {0:?}")]
    Injected(BackendOp),
}

impl StoreError {
    /// Returns true if this error was caused by a primary key conflict.
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            StoreError::DuplicateKey { .. } => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_detection() {
        let err = StoreError::DuplicateKey {
            table: "attempts",
            key: "1/2/3".into(),
        };
        assert!(err.is_duplicate_key());
        assert!(err.to_string().contains("1/2/3"));
        assert!(!StoreError::Corrupted("bad".into()).is_duplicate_key());
    }
}
