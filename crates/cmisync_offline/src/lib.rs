//! # cmisync Offline
//!
//! Offline attempt store for SCORM 1.2 activities.
//!
//! This crate provides:
//! - [`OfflineStore`]: attempts, per-element tracks and snapshots for one learner
//! - Attempt renumbering with exact undo receipts
//! - Force completed rules applied as tracks are written
//! - Reconstruction of runtime user data from stored tracks
//! - [`OperationLocks`]: advisory per-activity locks that hold off sync passes
//! - [`OfflineWriteQueue`]: a bounded, ordered, best-effort write path
//!
//! ## Key Invariants
//!
//! - An attempt number appears at most once per (activity, learner)
//! - Every track belongs to a registered attempt
//! - A failed multi-row write leaves no partial state behind
//! - Renumbered tracks are always unsynced

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod error;
mod locks;
mod queue;
mod store;
mod user_data;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{OfflineError, OfflineResult};
pub use locks::{
    OperationGuard, OperationLocks, CHANGE_ATTEMPT_NUMBER, COMPONENT, CREATE_NEW_ATTEMPT,
    SAVE_TRACKS_OFFLINE,
};
pub use queue::{OfflineWriteQueue, QueueConfig};
pub use store::{
    OfflineAttempt, OfflineStore, RenumberReceipt, StoredTrack, SyncedFilter, TrackTarget,
};
pub use user_data::build_user_data;
