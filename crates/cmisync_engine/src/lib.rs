//! # cmisync Engine
//!
//! Synchronization of offline SCORM attempts with the LMS.
//!
//! This crate provides:
//! - [`SyncEngine`]: per-activity sync passes with deduplication of
//!   concurrent requests
//! - Collision resolution between online and offline attempts
//! - Renumbering of diverged attempts with rollback on failure
//! - Attempt and mode selection for new sessions
//! - Grade calculation over attempt scores
//! - Helpers that prepare offline attempts from online data
//! - [`RemoteService`]: the LMS abstraction, with [`MockRemote`] for tests
//!
//! ## Architecture
//!
//! The LMS is authoritative. An offline attempt whose number is also used
//! online is only sent in place when the online attempt has not moved on
//! since it was copied (its snapshot still matches). Otherwise it becomes a
//! new attempt after the online ones.
//!
//! ## Key Invariants
//!
//! - At most one pass runs per activity
//! - No pass starts while an offline operation holds the activity
//! - Attempt numbers stay unique through renumbering
//! - A failed renumbering leaves every attempt where it was
//! - Only dotted elements reach the remote

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod grading;
mod helper;
mod remote;
mod report;
mod resolver;
mod snapshot;

pub use config::{BlockedPolicy, RetryConfig, SyncConfig, DEFAULT_SYNC_INTERVAL};
pub use engine::{SyncEngine, SyncFuture, SyncState, SyncStats};
pub use error::{RemoteError, RemoteResult, SyncError, SyncResult};
pub use grading::{calculate_grade, AttemptGrade};
pub use helper::{convert_attempt_to_offline, create_offline_attempt};
pub use remote::{MockRemote, RemoteService, Submission};
pub use report::{ActivitySync, SyncReport, SyncWarning};
pub use resolver::{
    count_attempts_left, determine_attempt_and_mode, determine_attempt_to_continue,
    AttemptChoice, AttemptInventory, LastAttempt, LaunchPlan,
};
pub use snapshot::snapshot_equals;
