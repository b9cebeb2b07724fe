//! Error types for the offline store.

use cmisync_model::{AttemptNumber, ScormId};
use cmisync_storage::StoreError;
use thiserror::Error;

/// Result type for offline store operations.
pub type OfflineResult<T> = Result<T, OfflineError>;

/// Errors that can occur in the offline store.
#[derive(Debug, Error)]
pub enum OfflineError {
    /// The storage backend failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A stored value or snapshot is not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The attempt does not exist offline.
    #[error("offline attempt {attempt} of activity {scorm_id} not found")]
    AttemptNotFound {
        /// Activity id.
        scorm_id: ScormId,
        /// Attempt number.
        attempt: AttemptNumber,
    },

    /// The write queue is full.
    #[error("write queue is full")]
    QueueFull,

    /// The write queue worker has stopped.
    #[error("write queue is closed")]
    QueueClosed,
}

impl OfflineError {
    /// Creates an attempt not found error.
    pub fn attempt_not_found(scorm_id: ScormId, attempt: AttemptNumber) -> Self {
        Self::AttemptNotFound { scorm_id, attempt }
    }

    /// Returns true if the target number is already taken.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, OfflineError::Store(err) if err.is_duplicate_key())
    }
}
