//! # cmisync Model
//!
//! SCORM 1.2 CMI runtime data model.
//!
//! This crate provides:
//! - The element schema (access modes, value formats, ranges, defaults)
//! - A runtime session implementing the eight-call SCORM 1.2 API
//! - Dirty tracking so each commit sends only changed elements
//! - Completion derivation and total time accumulation on `Finish`
//! - Online submission with automatic fallback to offline storage
//! - A thread-safe facade with delayed automatic commits
//! - Prerequisite expression evaluation
//!
//! ## Key Invariants
//!
//! - Read-only and keyword elements are never modified by content
//! - A rejected write leaves every value and counter untouched
//! - Collection counters only grow, one index at a time
//! - Values are stored exactly as written
//! - An element reaches persistence at most once per change
//!
//! ## Element Forms
//!
//! Content addresses collection items with dots (`cmi.objectives.0.id`).
//! Persistence and the LMS use underscores (`cmi.objectives_0.id`). The
//! schema is keyed by the generic form (`cmi.objectives.n.id`).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod config;
mod data_model;
mod error;
mod events;
mod persistence;
mod prerequisites;
pub mod schema;
mod time;
mod types;

pub use api::ScormApi;
pub use config::{
    ActivityConfig, ForceNewAttempt, GradingMethod, ScoInfo, SessionConfig,
    DEFAULT_AUTOCOMMIT_DELAY,
};
pub use data_model::{index_chain, DataModel, SessionState};
pub use error::{ErrorCode, PrerequisiteError, SinkError, TimeError};
pub use events::{event_channel, EventReceiver, EventSender, RuntimeEvent, RuntimeEventKind};
pub use persistence::{Persistence, RecordingSink, TrackBatch, TrackSink};
pub use prerequisites::evaluate_prerequisites;
pub use time::{add_time, Timespan};
pub use types::{
    is_attempt_incomplete, is_dotted, is_status_incomplete, normalize_status, AttemptNumber,
    CourseId, DataEntry, ElementMap, LearnerIdentity, Mode, ScoId, ScoUserData, ScormId,
    UserDataMap, UserId,
};
