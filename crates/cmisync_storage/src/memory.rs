//! In-memory storage backend for testing.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::backend::StoreBackend;
use crate::error::{StoreError, StoreResult};
use crate::record::{
    AttemptFilter, AttemptKey, AttemptRow, AttemptUpdate, TrackFilter, TrackKey, TrackRow,
    TrackUpdate,
};
use parking_lot::{Mutex, RwLock};

/// A backend operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    /// [`StoreBackend::put_attempt`].
    PutAttempt,
    /// [`StoreBackend::update_attempts`].
    UpdateAttempts,
    /// [`StoreBackend::delete_attempts`].
    DeleteAttempts,
    /// [`StoreBackend::put_track`].
    PutTrack,
    /// [`StoreBackend::update_tracks`].
    UpdateTracks,
    /// [`StoreBackend::delete_tracks`].
    DeleteTracks,
}

/// An in-memory storage backend.
///
/// This backend keeps both tables in ordered maps and is suitable for:
/// - Unit tests
/// - Integration tests, including rollback paths via [`Self::fail_after`]
/// - Ephemeral stores that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use cmisync_storage::{AttemptFilter, AttemptRow, InMemoryBackend, StoreBackend};
///
/// let backend = InMemoryBackend::new();
/// backend
///     .put_attempt(&AttemptRow {
///         scorm_id: 1,
///         user_id: 2,
///         attempt: 1,
///         course_id: 3,
///         time_created: 0,
///         time_modified: 0,
///         snapshot: None,
///     })
///     .unwrap();
/// assert_eq!(backend.get_attempts(&AttemptFilter::all()).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    attempts: RwLock<BTreeMap<AttemptKey, AttemptRow>>,
    tracks: RwLock<BTreeMap<TrackKey, TrackRow>>,
    failures: Mutex<HashMap<BackendOp, usize>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the call to `op` after `successes` more successful calls fail once.
    ///
    /// `fail_after(BackendOp::PutTrack, 0)` fails the very next track write.
    pub fn fail_after(&self, op: BackendOp, successes: usize) {
        self.failures.lock().insert(op, successes);
    }

    /// Removes every pending injected failure.
    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Returns the number of attempt rows.
    pub fn attempt_count(&self) -> usize {
        self.attempts.read().len()
    }

    /// Returns the number of track rows.
    pub fn track_count(&self) -> usize {
        self.tracks.read().len()
    }

    fn check(&self, op: BackendOp) -> StoreResult<()> {
        let mut failures = self.failures.lock();
        match failures.get_mut(&op) {
            Some(0) => {
                failures.remove(&op);
                Err(StoreError::Injected(op))
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl StoreBackend for InMemoryBackend {
    fn put_attempt(&self, row: &AttemptRow) -> StoreResult<()> {
        self.check(BackendOp::PutAttempt)?;
        self.attempts.write().insert(row.key(), row.clone());
        Ok(())
    }

    fn get_attempts(&self, filter: &AttemptFilter) -> StoreResult<Vec<AttemptRow>> {
        Ok(self
            .attempts
            .read()
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    fn update_attempts(
        &self,
        filter: &AttemptFilter,
        update: &AttemptUpdate,
    ) -> StoreResult<usize> {
        self.check(BackendOp::UpdateAttempts)?;
        let mut attempts = self.attempts.write();
        let matched: Vec<AttemptKey> = attempts
            .values()
            .filter(|row| filter.matches(row))
            .map(AttemptRow::key)
            .collect();

        let mut updated = Vec::with_capacity(matched.len());
        let mut new_keys = HashSet::new();
        let old_keys: HashSet<AttemptKey> = matched.iter().copied().collect();
        for key in &matched {
            let mut row = attempts[key].clone();
            update.apply(&mut row);
            let new_key = row.key();
            let taken = attempts.contains_key(&new_key) && !old_keys.contains(&new_key);
            if taken || !new_keys.insert(new_key) {
                return Err(StoreError::DuplicateKey {
                    table: "attempts",
                    key: new_key.to_string(),
                });
            }
            updated.push(row);
        }

        for key in &matched {
            attempts.remove(key);
        }
        for row in updated {
            attempts.insert(row.key(), row);
        }
        Ok(matched.len())
    }

    fn delete_attempts(&self, filter: &AttemptFilter) -> StoreResult<usize> {
        self.check(BackendOp::DeleteAttempts)?;
        let mut attempts = self.attempts.write();
        let before = attempts.len();
        attempts.retain(|_, row| !filter.matches(row));
        Ok(before - attempts.len())
    }

    fn put_track(&self, row: &TrackRow) -> StoreResult<()> {
        self.check(BackendOp::PutTrack)?;
        self.tracks.write().insert(row.key(), row.clone());
        Ok(())
    }

    fn get_tracks(&self, filter: &TrackFilter) -> StoreResult<Vec<TrackRow>> {
        Ok(self
            .tracks
            .read()
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    fn update_tracks(&self, filter: &TrackFilter, update: &TrackUpdate) -> StoreResult<usize> {
        self.check(BackendOp::UpdateTracks)?;
        let mut tracks = self.tracks.write();
        let matched: Vec<TrackKey> = tracks
            .values()
            .filter(|row| filter.matches(row))
            .map(TrackRow::key)
            .collect();

        let old_keys: HashSet<&TrackKey> = matched.iter().collect();
        let mut new_keys = HashSet::new();
        let mut updated = Vec::with_capacity(matched.len());
        for key in &matched {
            let mut row = tracks[key].clone();
            update.apply(&mut row);
            let new_key = row.key();
            let taken = tracks.contains_key(&new_key) && !old_keys.contains(&new_key);
            if taken || !new_keys.insert(new_key.clone()) {
                return Err(StoreError::DuplicateKey {
                    table: "tracks",
                    key: new_key.to_string(),
                });
            }
            updated.push(row);
        }

        for key in &matched {
            tracks.remove(key);
        }
        for row in updated {
            tracks.insert(row.key(), row);
        }
        Ok(matched.len())
    }

    fn delete_tracks(&self, filter: &TrackFilter) -> StoreResult<usize> {
        self.check(BackendOp::DeleteTracks)?;
        let mut tracks = self.tracks.write();
        let before = tracks.len();
        tracks.retain(|_, row| !filter.matches(row));
        Ok(before - tracks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(n: u32) -> AttemptRow {
        AttemptRow {
            scorm_id: 1,
            user_id: 2,
            attempt: n,
            course_id: 3,
            time_created: 100,
            time_modified: 100,
            snapshot: None,
        }
    }

    fn track(n: u32, element: &str) -> TrackRow {
        TrackRow {
            scorm_id: 1,
            user_id: 2,
            attempt: n,
            sco_id: 7,
            element: element.into(),
            value: Some("\"v\"".into()),
            time_modified: 100,
            synced: false,
        }
    }

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.attempt_count(), 0);
        assert_eq!(backend.track_count(), 0);
    }

    #[test]
    fn memory_put_replaces_same_key() {
        let backend = InMemoryBackend::new();
        backend.put_track(&track(1, "cmi.core.lesson_status")).unwrap();
        let mut row = track(1, "cmi.core.lesson_status");
        row.value = Some("\"completed\"".into());
        backend.put_track(&row).unwrap();

        let rows = backend.get_tracks(&TrackFilter::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value.as_deref(), Some("\"completed\""));
    }

    #[test]
    fn memory_update_rekeys_attempt() {
        let backend = InMemoryBackend::new();
        backend.put_attempt(&attempt(1)).unwrap();

        let changed = backend
            .update_attempts(
                &AttemptFilter::user(2).with_scorm(1).with_attempt(1),
                &AttemptUpdate {
                    attempt: Some(4),
                    ..AttemptUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(changed, 1);
        let rows = backend.get_attempts(&AttemptFilter::all()).unwrap();
        assert_eq!(rows[0].attempt, 4);
    }

    #[test]
    fn memory_update_onto_existing_key_fails_without_changes() {
        let backend = InMemoryBackend::new();
        backend.put_attempt(&attempt(1)).unwrap();
        backend.put_attempt(&attempt(2)).unwrap();

        let result = backend.update_attempts(
            &AttemptFilter::user(2).with_attempt(1),
            &AttemptUpdate {
                attempt: Some(2),
                ..AttemptUpdate::default()
            },
        );

        assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
        let numbers: Vec<u32> = backend
            .get_attempts(&AttemptFilter::all())
            .unwrap()
            .iter()
            .map(|row| row.attempt)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn memory_update_tracks_by_synced_flag() {
        let backend = InMemoryBackend::new();
        backend.put_track(&track(1, "a")).unwrap();
        backend.put_track(&track(1, "b")).unwrap();

        let key = attempt(1).key();
        let filter = TrackFilter::attempt(key).with_element("a");
        let update = TrackUpdate {
            synced: Some(true),
            ..TrackUpdate::default()
        };
        assert_eq!(backend.update_tracks(&filter, &update).unwrap(), 1);

        let unsynced = backend
            .get_tracks(&TrackFilter::attempt(key).with_synced(false))
            .unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].element, "b");
    }

    #[test]
    fn memory_injected_failure_fires_once() {
        let backend = InMemoryBackend::new();
        backend.fail_after(BackendOp::PutTrack, 1);

        backend.put_track(&track(1, "a")).unwrap();
        let result = backend.put_track(&track(1, "b"));
        assert!(matches!(
            result,
            Err(StoreError::Injected(BackendOp::PutTrack))
        ));
        backend.put_track(&track(1, "b")).unwrap();
        assert_eq!(backend.track_count(), 2);
    }

    #[test]
    fn memory_delete_by_filter() {
        let backend = InMemoryBackend::new();
        backend.put_track(&track(1, "a")).unwrap();
        backend.put_track(&track(2, "a")).unwrap();

        let deleted = backend
            .delete_tracks(&TrackFilter::attempt(attempt(1).key()))
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(backend.track_count(), 1);
    }
}
