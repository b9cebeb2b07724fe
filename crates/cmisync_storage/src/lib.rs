//! # cmisync Storage
//!
//! Local persistence for offline SCORM attempts.
//!
//! The offline store keeps two tables: an attempt registry and a per-element
//! track log. This crate defines the rows, the exact-match filters used to
//! query them, and the [`StoreBackend`] trait with two implementations.
//!
//! ## Design Principles
//!
//! - Backends store rows, they do not interpret element values
//! - Every update is atomic over the rows it matches
//! - Primary keys are never duplicated, even transiently
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`SqliteBackend`] - For persistent storage using an embedded database
//!
//! ## Example
//!
//! ```rust
//! use cmisync_storage::{StoreBackend, SqliteBackend, TrackFilter, TrackRow};
//!
//! let backend = SqliteBackend::open_in_memory().unwrap();
//! backend.put_track(&TrackRow {
//!     scorm_id: 1,
//!     user_id: 2,
//!     attempt: 1,
//!     sco_id: 10,
//!     element: "cmi.core.lesson_status".into(),
//!     value: Some("\"incomplete\"".into()),
//!     time_modified: 0,
//!     synced: false,
//! }).unwrap();
//! let rows = backend.get_tracks(&TrackFilter::default().with_synced(false)).unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod record;
mod sqlite;

pub use backend::StoreBackend;
pub use error::{StoreError, StoreResult};
pub use memory::{BackendOp, InMemoryBackend};
pub use record::{
    AttemptFilter, AttemptKey, AttemptRow, AttemptUpdate, TrackFilter, TrackKey, TrackRow,
    TrackUpdate,
};
pub use sqlite::{SqliteBackend, ATTEMPTS_TABLE, TRACKS_TABLE};
