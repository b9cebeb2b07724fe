//! Storage backend trait definition.

use crate::error::StoreResult;
use crate::record::{AttemptFilter, AttemptRow, AttemptUpdate, TrackFilter, TrackRow, TrackUpdate};

/// Local persistence for the offline attempt store.
///
/// A backend owns two tables: attempts keyed by `(scorm_id, user_id,
/// attempt)` and tracks keyed by `(scorm_id, user_id, attempt, sco_id,
/// element)`. Backends do not interpret values; the offline store owns all
/// encoding.
///
/// # Invariants
///
/// - `put_*` replaces any row with the same primary key
/// - `update_*` applies to every matching row or to none of them; a change
///   that would collide with an existing primary key fails with
///   [`crate::StoreError::DuplicateKey`] (or the SQLite constraint error)
/// - `get_*` returns rows ordered by primary key
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing, with failure injection
/// - [`super::SqliteBackend`] - For persistent storage
pub trait StoreBackend: Send + Sync {
    /// Inserts or replaces an attempt row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written.
    fn put_attempt(&self, row: &AttemptRow) -> StoreResult<()>;

    /// Returns all attempt rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    fn get_attempts(&self, filter: &AttemptFilter) -> StoreResult<Vec<AttemptRow>>;

    /// Applies `update` to every attempt row matching `filter`.
    ///
    /// Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update would duplicate a primary key or the
    /// table cannot be written. No row is changed in that case.
    fn update_attempts(&self, filter: &AttemptFilter, update: &AttemptUpdate)
        -> StoreResult<usize>;

    /// Deletes every attempt row matching `filter`, returning the count.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be written.
    fn delete_attempts(&self, filter: &AttemptFilter) -> StoreResult<usize>;

    /// Inserts or replaces a track row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written.
    fn put_track(&self, row: &TrackRow) -> StoreResult<()>;

    /// Returns all track rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    fn get_tracks(&self, filter: &TrackFilter) -> StoreResult<Vec<TrackRow>>;

    /// Applies `update` to every track row matching `filter`.
    ///
    /// # Errors
    ///
    /// Same contract as [`StoreBackend::update_attempts`].
    fn update_tracks(&self, filter: &TrackFilter, update: &TrackUpdate) -> StoreResult<usize>;

    /// Deletes every track row matching `filter`, returning the count.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be written.
    fn delete_tracks(&self, filter: &TrackFilter) -> StoreResult<usize>;
}
