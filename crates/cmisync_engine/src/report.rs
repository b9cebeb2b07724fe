//! Outcome types of a sync pass.

use std::fmt;

use cmisync_model::{AttemptNumber, ScormId};
use serde::Serialize;

use crate::error::SyncResult;

/// A problem that did not abort the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncWarning {
    /// Offline attempts were kept because the last online attempt is still
    /// open.
    OnlineAttemptIncomplete {
        /// The open online attempt.
        attempt: AttemptNumber,
    },
    /// Some renumbered attempts wait until the last online attempt is
    /// finished.
    CannotSyncSome {
        /// The open online attempt.
        last_online: AttemptNumber,
    },
    /// A diverged attempt could not become a new attempt and was deleted.
    OfflineDataDeleted {
        /// The deleted attempt.
        attempt: AttemptNumber,
    },
    /// The remote rejected an attempt's data, which was deleted.
    DataDiscarded {
        /// The deleted attempt.
        attempt: AttemptNumber,
        /// Rejection message.
        reason: String,
    },
    /// An attempt could not be sent and stays offline for a later pass.
    AttemptFailed {
        /// The attempt kept offline.
        attempt: AttemptNumber,
        /// Failure message.
        error: String,
    },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncWarning::OnlineAttemptIncomplete { attempt } => write!(
                f,
                "offline attempts cannot be sent while online attempt {attempt} is incomplete"
            ),
            SyncWarning::CannotSyncSome { last_online } => write!(
                f,
                "some offline attempts wait for online attempt {last_online} to be finished"
            ),
            SyncWarning::OfflineDataDeleted { attempt } => write!(
                f,
                "offline attempt {attempt} could not be kept as a new attempt and was deleted"
            ),
            SyncWarning::DataDiscarded { attempt, reason } => {
                write!(f, "data of attempt {attempt} was rejected and discarded: {reason}")
            }
            SyncWarning::AttemptFailed { attempt, error } => {
                write!(f, "attempt {attempt} could not be sent: {error}")
            }
        }
    }
}

/// Result of syncing one activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Problems that did not abort the pass.
    pub warnings: Vec<SyncWarning>,
    /// Whether the pass finished an online attempt.
    pub attempt_finished: bool,
    /// Whether data was sent to the remote.
    pub updated: bool,
}

/// Result of one activity in [`crate::SyncEngine::sync_all`].
#[derive(Debug, Clone)]
pub struct ActivitySync {
    /// Activity id.
    pub scorm_id: ScormId,
    /// Outcome of the pass.
    pub result: SyncResult<SyncReport>,
}
