//! Where committed tracks go.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::SinkError;
use crate::types::{AttemptNumber, CourseId, DataEntry, ElementMap, ScoId, ScormId};

/// Changed elements of one SCO, produced by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackBatch {
    /// Activity id.
    pub scorm_id: ScormId,
    /// Course id.
    pub course_id: CourseId,
    /// SCO id.
    pub sco_id: ScoId,
    /// Attempt number.
    pub attempt: AttemptNumber,
    /// Changed elements in storage form.
    pub tracks: Vec<DataEntry>,
    /// Whether the force completed policy applies.
    pub force_completed: bool,
    /// Working values of the SCO when the batch was produced.
    pub sco_data: ElementMap,
}

/// Persistence collaborator of the data model.
///
/// Implementations must not block for long: commits run inside content
/// callbacks.
pub trait TrackSink: Send + Sync {
    /// Stores a batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch was not accepted.
    fn save_tracks(&self, batch: &TrackBatch) -> Result<(), SinkError>;
}

/// The sinks a session writes to.
#[derive(Clone)]
pub struct Persistence {
    /// Remote submission, absent when the device is offline only.
    pub online: Option<Arc<dyn TrackSink>>,
    /// Local storage.
    pub offline: Arc<dyn TrackSink>,
}

impl Persistence {
    /// Persistence that only writes locally.
    pub fn offline_only(offline: Arc<dyn TrackSink>) -> Self {
        Self {
            online: None,
            offline,
        }
    }

    /// Persistence that submits online and falls back to `offline`.
    pub fn with_online(online: Arc<dyn TrackSink>, offline: Arc<dyn TrackSink>) -> Self {
        Self {
            online: Some(online),
            offline,
        }
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("online", &self.online.is_some())
            .finish_non_exhaustive()
    }
}

/// A sink that records batches in memory.
///
/// Useful for testing. Can be switched to fail every call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<TrackBatch>>,
    failing: AtomicBool,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns every batch accepted so far.
    pub fn batches(&self) -> Vec<TrackBatch> {
        self.batches.lock().clone()
    }

    /// Returns every accepted entry, in order.
    pub fn entries(&self) -> Vec<DataEntry> {
        self.batches
            .lock()
            .iter()
            .flat_map(|batch| batch.tracks.iter().cloned())
            .collect()
    }
}

impl TrackSink for RecordingSink {
    fn save_tracks(&self, batch: &TrackBatch) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("recording sink set to fail".into()));
        }
        self.batches.lock().push(batch.clone());
        Ok(())
    }
}
