//! Error types for the sync engine.

use std::sync::Arc;

use cmisync_model::ScormId;
use cmisync_offline::OfflineError;
use thiserror::Error;

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors reported by a [`crate::RemoteService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote could not be reached. The same call may succeed later.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The remote refused the request. Repeating it will not help.
    #[error("remote rejected the request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Creates an unreachable error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }

    /// Creates a rejection.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_))
    }
}

/// Errors that abort a sync pass.
///
/// Cloneable so that callers sharing an in-flight pass all receive it.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// The offline store failed.
    #[error("offline store error: {0}")]
    Offline(Arc<OfflineError>),

    /// A remote call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// An offline operation is in progress for the activity.
    #[error("activity {scorm_id} is blocked by an offline operation")]
    Blocked {
        /// Activity id.
        scorm_id: ScormId,
    },
}

impl SyncError {
    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Offline(_) => false,
            SyncError::Remote(err) => err.is_retryable(),
            SyncError::Blocked { .. } => true,
        }
    }
}

impl From<OfflineError> for SyncError {
    fn from(err: OfflineError) -> Self {
        SyncError::Offline(Arc::new(err))
    }
}
