//! The offline attempt store.

use std::sync::Arc;

use cmisync_model::{
    ActivityConfig, AttemptNumber, CourseId, ElementMap, ScoId, ScormId, SinkError, TrackBatch,
    TrackSink, UserDataMap, UserId,
};
use cmisync_storage::{
    AttemptFilter, AttemptKey, AttemptRow, AttemptUpdate, StoreBackend, TrackFilter, TrackRow,
    TrackUpdate,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{OfflineError, OfflineResult};
use crate::locks::{
    OperationLocks, CHANGE_ATTEMPT_NUMBER, COMPONENT, CREATE_NEW_ATTEMPT, SAVE_TRACKS_OFFLINE,
};

const LESSON_STATUS: &str = "cmi.core.lesson_status";
const SCORE_RAW: &str = "cmi.core.score.raw";
const START_TIME_SUFFIX: &str = ".start.time";

/// Which tracks [`OfflineStore::stored_data`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncedFilter {
    /// Every track.
    #[default]
    All,
    /// Tracks not yet sent.
    OnlyUnsynced,
    /// Tracks already sent.
    OnlySynced,
}

impl SyncedFilter {
    fn flag(self) -> Option<bool> {
        match self {
            SyncedFilter::All => None,
            SyncedFilter::OnlyUnsynced => Some(false),
            SyncedFilter::OnlySynced => Some(true),
        }
    }
}

/// The (activity, SCO, attempt) a track belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackTarget {
    /// Activity id.
    pub scorm_id: ScormId,
    /// SCO id.
    pub sco_id: ScoId,
    /// Attempt number.
    pub attempt: AttemptNumber,
}

/// A track read back from the store, with its value decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredTrack {
    /// SCO id.
    pub sco_id: ScoId,
    /// Element name.
    pub element: String,
    /// Decoded value; `""` for a stored null.
    pub value: String,
    /// Last write time.
    pub time_modified: i64,
    /// Whether the track was sent.
    pub synced: bool,
}

/// An attempt registered offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineAttempt {
    /// Activity id.
    pub scorm_id: ScormId,
    /// Learner id.
    pub user_id: UserId,
    /// Attempt number.
    pub attempt: AttemptNumber,
    /// Course id.
    pub course_id: CourseId,
    /// Creation time.
    pub time_created: i64,
    /// Last modification time.
    pub time_modified: i64,
    /// Remote data seen when the attempt was created, if any.
    pub snapshot: Option<UserDataMap>,
}

impl OfflineAttempt {
    fn from_row(row: AttemptRow) -> OfflineResult<Self> {
        let snapshot = row
            .snapshot
            .as_deref()
            .map(serde_json::from_str::<UserDataMap>)
            .transpose()?;
        Ok(Self {
            scorm_id: row.scorm_id,
            user_id: row.user_id,
            attempt: row.attempt,
            course_id: row.course_id,
            time_created: row.time_created,
            time_modified: row.time_modified,
            snapshot,
        })
    }
}

/// Everything needed to revert an attempt renumbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenumberReceipt {
    /// Activity id.
    pub scorm_id: ScormId,
    /// Number before the change.
    pub from: AttemptNumber,
    /// Number after the change.
    pub to: AttemptNumber,
    /// Modification time before the change.
    pub time_modified: i64,
    /// Tracks that were synced before the change.
    pub synced_tracks: Vec<(ScoId, String)>,
}

/// Durable store of offline attempts and their tracks for one learner.
///
/// Values are stored JSON encoded. Writes that change an activity's data
/// register an operation in the shared [`OperationLocks`] while they run.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use cmisync_model::{ActivityConfig, ScoUserData, UserDataMap};
/// use cmisync_offline::{OfflineStore, SyncedFilter};
/// use cmisync_storage::InMemoryBackend;
///
/// let store = OfflineStore::new(Arc::new(InMemoryBackend::new()), 2);
/// let activity = ActivityConfig::new(10, 1);
/// let mut data = UserDataMap::new();
/// data.insert(5, ScoUserData::new(5).with_value("cmi.core.lesson_status", "incomplete"));
///
/// store.create_attempt(&activity, 1, &data, None).unwrap();
/// let tracks = store.stored_data(10, 1, SyncedFilter::OnlyUnsynced).unwrap();
/// assert_eq!(tracks[0].value, "incomplete");
/// ```
#[derive(Clone)]
pub struct OfflineStore {
    backend: Arc<dyn StoreBackend>,
    user_id: UserId,
    locks: Arc<OperationLocks>,
    clock: Arc<dyn Clock>,
}

impl OfflineStore {
    /// Creates a store for `user_id` with its own lock registry.
    pub fn new(backend: Arc<dyn StoreBackend>, user_id: UserId) -> Self {
        Self {
            backend,
            user_id,
            locks: Arc::new(OperationLocks::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Shares a lock registry with other components.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<OperationLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Uses another time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the learner id.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the lock registry.
    pub fn locks(&self) -> &Arc<OperationLocks> {
        &self.locks
    }

    /// Returns the storage backend.
    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }

    /// Returns the store's current time.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    fn key(&self, scorm_id: ScormId, attempt: AttemptNumber) -> AttemptKey {
        AttemptKey {
            scorm_id,
            user_id: self.user_id,
            attempt,
        }
    }

    /// Creates an attempt and stores every transmittable element of
    /// `user_data` as unsynced tracks.
    ///
    /// `snapshot` is the remote data the attempt starts from; launch
    /// defaults are stripped before it is stored. If any write fails, the
    /// partial attempt is deleted and the error returned.
    pub fn create_attempt(
        &self,
        activity: &ActivityConfig,
        attempt: AttemptNumber,
        user_data: &UserDataMap,
        snapshot: Option<&UserDataMap>,
    ) -> OfflineResult<()> {
        let _guard = self
            .locks
            .acquire(COMPONENT, activity.scorm_id, CREATE_NEW_ATTEMPT);
        debug!(scorm_id = activity.scorm_id, attempt, "creating offline attempt");

        let now = self.now();
        let row = AttemptRow {
            scorm_id: activity.scorm_id,
            user_id: self.user_id,
            attempt,
            course_id: activity.course_id,
            time_created: now,
            time_modified: now,
            snapshot: snapshot.map(encode_snapshot).transpose()?,
        };

        let result = self.backend.put_attempt(&row).map_err(OfflineError::from).and_then(|()| {
            for sco in user_data.values() {
                let target = TrackTarget {
                    scorm_id: activity.scorm_id,
                    sco_id: sco.sco_id,
                    attempt,
                };
                for (element, value) in sco.dotted() {
                    self.insert_track(
                        target,
                        element,
                        Some(value),
                        activity.force_completed,
                        &sco.userdata,
                    )?;
                }
            }
            Ok(())
        });

        if let Err(err) = result {
            if let Err(cleanup) = self.delete_attempt(activity.scorm_id, attempt) {
                warn!(
                    scorm_id = activity.scorm_id,
                    attempt,
                    error = %cleanup,
                    "failed to remove partially created attempt"
                );
            }
            return Err(err);
        }
        Ok(())
    }

    /// Stores one element.
    ///
    /// With `force_completed`, an `incomplete` status written while a raw
    /// score exists is stored as `completed`, and a raw score written while
    /// the status is `incomplete` first stores `completed` (reverted if the
    /// score write fails). Elements ending in `.start.time` keep their first
    /// value.
    pub fn insert_track(
        &self,
        target: TrackTarget,
        element: &str,
        value: Option<&str>,
        force_completed: bool,
        sco_data: &ElementMap,
    ) -> OfflineResult<()> {
        let mut value = value.map(str::to_string);
        let mut status_forced = false;

        if force_completed {
            let has_score = sco_data.get(SCORE_RAW).is_some_and(|raw| !raw.is_empty());
            if element == LESSON_STATUS && value.as_deref() == Some("incomplete") && has_score {
                value = Some("completed".to_string());
            }
            if element == SCORE_RAW
                && sco_data.get(LESSON_STATUS).map(String::as_str) == Some("incomplete")
            {
                self.put_track(target, LESSON_STATUS, Some("completed"))?;
                status_forced = true;
            }
        }

        if element.ends_with(START_TIME_SUFFIX) && self.has_track(target, element)? {
            debug!(element, "keeping original start time");
            return Ok(());
        }

        if let Err(err) = self.put_track(target, element, value.as_deref()) {
            if status_forced {
                if let Err(rollback) = self.put_track(target, LESSON_STATUS, Some("incomplete")) {
                    warn!(error = %rollback, "failed to restore lesson status");
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Stores a commit batch, registering the attempt if it is new.
    pub fn save_tracks(&self, batch: &TrackBatch) -> OfflineResult<()> {
        let _guard = self
            .locks
            .acquire(COMPONENT, batch.scorm_id, SAVE_TRACKS_OFFLINE);

        let key = self.key(batch.scorm_id, batch.attempt);
        if self.backend.get_attempts(&AttemptFilter::from(key))?.is_empty() {
            let now = self.now();
            self.backend.put_attempt(&AttemptRow {
                scorm_id: batch.scorm_id,
                user_id: self.user_id,
                attempt: batch.attempt,
                course_id: batch.course_id,
                time_created: now,
                time_modified: now,
                snapshot: None,
            })?;
        }

        let target = TrackTarget {
            scorm_id: batch.scorm_id,
            sco_id: batch.sco_id,
            attempt: batch.attempt,
        };
        for entry in &batch.tracks {
            self.insert_track(
                target,
                &entry.element,
                Some(&entry.value),
                batch.force_completed,
                &batch.sco_data,
            )?;
        }
        debug!(
            scorm_id = batch.scorm_id,
            sco_id = batch.sco_id,
            attempt = batch.attempt,
            tracks = batch.tracks.len(),
            "saved tracks offline"
        );
        Ok(())
    }

    /// Moves an attempt and all its tracks to another number.
    ///
    /// Tracks become unsynced. If the tracks cannot be moved the attempt row
    /// is moved back. The receipt lets [`Self::undo_attempt_number_change`]
    /// restore the previous state exactly.
    pub fn change_attempt_number(
        &self,
        scorm_id: ScormId,
        from: AttemptNumber,
        to: AttemptNumber,
    ) -> OfflineResult<RenumberReceipt> {
        let _guard = self
            .locks
            .acquire(COMPONENT, scorm_id, CHANGE_ATTEMPT_NUMBER);
        debug!(scorm_id, from, to, "changing attempt number");

        let old = self.key(scorm_id, from);
        let row = self
            .backend
            .get_attempts(&AttemptFilter::from(old))?
            .into_iter()
            .next()
            .ok_or_else(|| OfflineError::attempt_not_found(scorm_id, from))?;
        let synced_tracks = self
            .backend
            .get_tracks(&TrackFilter::attempt(old).with_synced(true))?
            .into_iter()
            .map(|track| (track.sco_id, track.element))
            .collect();

        self.backend.update_attempts(
            &AttemptFilter::from(old),
            &AttemptUpdate {
                attempt: Some(to),
                time_modified: Some(self.now()),
                snapshot: None,
            },
        )?;

        let moved = self.backend.update_tracks(
            &TrackFilter::attempt(old),
            &TrackUpdate {
                attempt: Some(to),
                synced: Some(false),
            },
        );
        if let Err(err) = moved {
            let restored = self.backend.update_attempts(
                &AttemptFilter::from(self.key(scorm_id, to)),
                &AttemptUpdate {
                    attempt: Some(from),
                    time_modified: Some(row.time_modified),
                    snapshot: None,
                },
            );
            if let Err(restore) = restored {
                warn!(scorm_id, from, to, error = %restore, "failed to restore attempt number");
            }
            return Err(err.into());
        }

        info!(scorm_id, from, to, "offline attempt renumbered");
        Ok(RenumberReceipt {
            scorm_id,
            from,
            to,
            time_modified: row.time_modified,
            synced_tracks,
        })
    }

    /// Reverts a renumbering, including the synced flags of its tracks.
    pub fn undo_attempt_number_change(&self, receipt: &RenumberReceipt) -> OfflineResult<()> {
        let _guard = self
            .locks
            .acquire(COMPONENT, receipt.scorm_id, CHANGE_ATTEMPT_NUMBER);
        let current = self.key(receipt.scorm_id, receipt.to);
        let previous = self.key(receipt.scorm_id, receipt.from);

        self.backend.update_attempts(
            &AttemptFilter::from(current),
            &AttemptUpdate {
                attempt: Some(receipt.from),
                time_modified: Some(receipt.time_modified),
                snapshot: None,
            },
        )?;
        self.backend.update_tracks(
            &TrackFilter::attempt(current),
            &TrackUpdate {
                attempt: Some(receipt.from),
                synced: None,
            },
        )?;
        for (sco_id, element) in &receipt.synced_tracks {
            self.backend.update_tracks(
                &TrackFilter::attempt(previous)
                    .with_sco(*sco_id)
                    .with_element(element.clone()),
                &TrackUpdate {
                    attempt: None,
                    synced: Some(true),
                },
            )?;
        }

        info!(
            scorm_id = receipt.scorm_id,
            from = receipt.to,
            to = receipt.from,
            "attempt renumbering reverted"
        );
        Ok(())
    }

    /// Deletes an attempt and its tracks.
    pub fn delete_attempt(&self, scorm_id: ScormId, attempt: AttemptNumber) -> OfflineResult<()> {
        debug!(scorm_id, attempt, "deleting offline attempt");
        let key = self.key(scorm_id, attempt);
        self.backend.delete_tracks(&TrackFilter::attempt(key))?;
        self.backend.delete_attempts(&AttemptFilter::from(key))?;
        Ok(())
    }

    /// Marks every track of one SCO as synced. Returns how many changed.
    pub fn mark_synced(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
        sco_id: ScoId,
    ) -> OfflineResult<usize> {
        let key = self.key(scorm_id, attempt);
        let updated = self.backend.update_tracks(
            &TrackFilter::attempt(key).with_sco(sco_id),
            &TrackUpdate {
                attempt: None,
                synced: Some(true),
            },
        )?;
        Ok(updated)
    }

    /// Returns the tracks of an attempt.
    pub fn stored_data(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
        filter: SyncedFilter,
    ) -> OfflineResult<Vec<StoredTrack>> {
        let mut tracks = TrackFilter::attempt(self.key(scorm_id, attempt));
        tracks.synced = filter.flag();

        self.backend
            .get_tracks(&tracks)?
            .into_iter()
            .map(|row| {
                Ok(StoredTrack {
                    value: decode_value(row.value.as_deref())?,
                    sco_id: row.sco_id,
                    element: row.element,
                    time_modified: row.time_modified,
                    synced: row.synced,
                })
            })
            .collect()
    }

    /// Stores (or clears) the snapshot of an attempt.
    pub fn set_snapshot(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
        snapshot: Option<&UserDataMap>,
    ) -> OfflineResult<()> {
        debug!(scorm_id, attempt, "setting attempt snapshot");
        let updated = self.backend.update_attempts(
            &AttemptFilter::from(self.key(scorm_id, attempt)),
            &AttemptUpdate {
                attempt: None,
                time_modified: Some(self.now()),
                snapshot: Some(snapshot.map(encode_snapshot).transpose()?),
            },
        )?;
        if updated == 0 {
            return Err(OfflineError::attempt_not_found(scorm_id, attempt));
        }
        Ok(())
    }

    /// Returns the snapshot of an attempt, if it has one.
    pub fn snapshot(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
    ) -> OfflineResult<Option<UserDataMap>> {
        Ok(self
            .attempt(scorm_id, attempt)?
            .and_then(|attempt| attempt.snapshot))
    }

    /// Returns the learner's offline attempts of an activity, by number.
    pub fn attempts(&self, scorm_id: ScormId) -> OfflineResult<Vec<OfflineAttempt>> {
        self.load_attempts(&AttemptFilter::user(self.user_id).with_scorm(scorm_id))
    }

    /// Returns every offline attempt in the store, of every learner.
    pub fn all_attempts(&self) -> OfflineResult<Vec<OfflineAttempt>> {
        self.load_attempts(&AttemptFilter::all())
    }

    /// Returns one offline attempt.
    pub fn attempt(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
    ) -> OfflineResult<Option<OfflineAttempt>> {
        Ok(self
            .load_attempts(&AttemptFilter::from(self.key(scorm_id, attempt)))?
            .into_iter()
            .next())
    }

    /// Returns the creation time of an attempt.
    pub fn creation_time(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
    ) -> OfflineResult<Option<i64>> {
        Ok(self
            .attempt(scorm_id, attempt)?
            .map(|attempt| attempt.time_created))
    }

    fn load_attempts(&self, filter: &AttemptFilter) -> OfflineResult<Vec<OfflineAttempt>> {
        let mut attempts = self
            .backend
            .get_attempts(filter)?
            .into_iter()
            .map(OfflineAttempt::from_row)
            .collect::<OfflineResult<Vec<_>>>()?;
        attempts.sort_by_key(|a| (a.scorm_id, a.user_id, a.attempt));
        Ok(attempts)
    }

    fn has_track(&self, target: TrackTarget, element: &str) -> OfflineResult<bool> {
        let filter = TrackFilter::attempt(self.key(target.scorm_id, target.attempt))
            .with_sco(target.sco_id)
            .with_element(element);
        Ok(!self.backend.get_tracks(&filter)?.is_empty())
    }

    fn put_track(&self, target: TrackTarget, element: &str, value: Option<&str>) -> OfflineResult<()> {
        let value = value.map(serde_json::to_string).transpose()?;
        self.backend.put_track(&TrackRow {
            scorm_id: target.scorm_id,
            user_id: self.user_id,
            attempt: target.attempt,
            sco_id: target.sco_id,
            element: element.to_string(),
            value,
            time_modified: self.now(),
            synced: false,
        })?;
        Ok(())
    }
}

impl TrackSink for OfflineStore {
    fn save_tracks(&self, batch: &TrackBatch) -> Result<(), SinkError> {
        OfflineStore::save_tracks(self, batch).map_err(|err| SinkError::Unavailable(err.to_string()))
    }
}

impl std::fmt::Debug for OfflineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineStore")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

fn encode_snapshot(snapshot: &UserDataMap) -> OfflineResult<String> {
    let mut stripped = snapshot.clone();
    for sco in stripped.values_mut() {
        sco.defaultdata.clear();
    }
    Ok(serde_json::to_string(&stripped)?)
}

fn decode_value(raw: Option<&str>) -> OfflineResult<String> {
    let Some(raw) = raw else {
        return Ok(String::new());
    };
    Ok(match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::String(value) => value,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use cmisync_model::{DataEntry, ScoUserData};
    use cmisync_storage::{BackendOp, InMemoryBackend};

    const SCORM: ScormId = 10;

    fn store() -> (OfflineStore, Arc<InMemoryBackend>, Arc<ManualClock>) {
        let backend = Arc::new(InMemoryBackend::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let store = OfflineStore::new(backend.clone(), 2).with_clock(clock.clone());
        (store, backend, clock)
    }

    fn activity() -> ActivityConfig {
        ActivityConfig::new(SCORM, 1)
    }

    fn data() -> UserDataMap {
        UserDataMap::from([(
            5,
            ScoUserData::new(5)
                .with_value("cmi.core.lesson_status", "incomplete")
                .with_value("cmi.suspend_data", "abc")
                .with_value("status", "incomplete")
                .with_default("cmi.core.student_name", "Doe"),
        )])
    }

    fn target(attempt: AttemptNumber) -> TrackTarget {
        TrackTarget {
            scorm_id: SCORM,
            sco_id: 5,
            attempt,
        }
    }

    fn value_of(store: &OfflineStore, attempt: AttemptNumber, element: &str) -> Option<String> {
        store
            .stored_data(SCORM, attempt, SyncedFilter::All)
            .unwrap()
            .into_iter()
            .find(|t| t.element == element)
            .map(|t| t.value)
    }

    #[test]
    fn create_attempt_stores_dotted_values_only() {
        let (store, _, _) = store();
        store.create_attempt(&activity(), 1, &data(), Some(&data())).unwrap();

        let tracks = store.stored_data(SCORM, 1, SyncedFilter::All).unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks.iter().all(|t| !t.synced));

        let attempt = store.attempt(SCORM, 1).unwrap().unwrap();
        assert_eq!(attempt.time_created, 1_000);
        let snapshot = attempt.snapshot.unwrap();
        assert!(snapshot[&5].defaultdata.is_empty());
        assert_eq!(snapshot[&5].userdata["status"], "incomplete");
    }

    #[test]
    fn create_attempt_rolls_back_on_failure() {
        let (store, backend, _) = store();
        backend.fail_after(BackendOp::PutTrack, 1);
        assert!(store.create_attempt(&activity(), 1, &data(), None).is_err());
        assert_eq!(backend.attempt_count(), 0);
        assert_eq!(backend.track_count(), 0);
        assert!(!store.locks().is_blocked(COMPONENT, SCORM));
    }

    #[test]
    fn force_completed_rewrites_incomplete_status() {
        let (store, _, _) = store();
        let sco_data = ElementMap::from([(SCORE_RAW.to_string(), "50".to_string())]);
        store
            .insert_track(target(1), LESSON_STATUS, Some("incomplete"), true, &sco_data)
            .unwrap();
        assert_eq!(value_of(&store, 1, LESSON_STATUS).as_deref(), Some("completed"));
    }

    #[test]
    fn force_completed_score_writes_status_first() {
        let (store, _, _) = store();
        let sco_data = ElementMap::from([(LESSON_STATUS.to_string(), "incomplete".to_string())]);
        store
            .insert_track(target(1), SCORE_RAW, Some("80"), true, &sco_data)
            .unwrap();
        assert_eq!(value_of(&store, 1, LESSON_STATUS).as_deref(), Some("completed"));
        assert_eq!(value_of(&store, 1, SCORE_RAW).as_deref(), Some("80"));
    }

    #[test]
    fn force_completed_reverts_status_when_score_fails() {
        let (store, backend, _) = store();
        let sco_data = ElementMap::from([(LESSON_STATUS.to_string(), "incomplete".to_string())]);
        backend.fail_after(BackendOp::PutTrack, 1);
        assert!(store
            .insert_track(target(1), SCORE_RAW, Some("80"), true, &sco_data)
            .is_err());
        assert_eq!(value_of(&store, 1, LESSON_STATUS).as_deref(), Some("incomplete"));
        assert_eq!(value_of(&store, 1, SCORE_RAW), None);
    }

    #[test]
    fn start_time_is_never_overwritten() {
        let (store, _, _) = store();
        let empty = ElementMap::new();
        store.insert_track(target(1), "x.start.time", Some("100"), false, &empty).unwrap();
        store.insert_track(target(1), "x.start.time", Some("200"), false, &empty).unwrap();
        assert_eq!(value_of(&store, 1, "x.start.time").as_deref(), Some("100"));
    }

    #[test]
    fn save_tracks_registers_missing_attempt() {
        let (store, _, _) = store();
        let batch = TrackBatch {
            scorm_id: SCORM,
            course_id: 1,
            sco_id: 5,
            attempt: 3,
            tracks: vec![DataEntry::new("cmi.core.lesson_location", "p2")],
            force_completed: false,
            sco_data: ElementMap::new(),
        };
        store.save_tracks(&batch).unwrap();
        assert!(store.attempt(SCORM, 3).unwrap().is_some());
        assert_eq!(value_of(&store, 3, "cmi.core.lesson_location").as_deref(), Some("p2"));
    }

    #[test]
    fn renumber_marks_tracks_unsynced_and_undo_restores() {
        let (store, _, clock) = store();
        store.create_attempt(&activity(), 2, &data(), None).unwrap();
        store.mark_synced(SCORM, 2, 5).unwrap();
        clock.advance(60);

        let receipt = store.change_attempt_number(SCORM, 2, 4).unwrap();
        assert!(store.attempt(SCORM, 2).unwrap().is_none());
        let moved = store.attempt(SCORM, 4).unwrap().unwrap();
        assert_eq!(moved.time_modified, 1_060);
        assert!(store
            .stored_data(SCORM, 4, SyncedFilter::OnlySynced)
            .unwrap()
            .is_empty());

        store.undo_attempt_number_change(&receipt).unwrap();
        let restored = store.attempt(SCORM, 2).unwrap().unwrap();
        assert_eq!(restored.time_modified, 1_000);
        assert_eq!(store.stored_data(SCORM, 2, SyncedFilter::OnlySynced).unwrap().len(), 2);
    }

    #[test]
    fn renumber_reverts_attempt_when_tracks_fail() {
        let (store, backend, _) = store();
        store.create_attempt(&activity(), 1, &data(), None).unwrap();
        backend.fail_after(BackendOp::UpdateTracks, 0);

        assert!(store.change_attempt_number(SCORM, 1, 2).is_err());
        assert!(store.attempt(SCORM, 1).unwrap().is_some());
        assert!(store.attempt(SCORM, 2).unwrap().is_none());
        assert_eq!(store.stored_data(SCORM, 1, SyncedFilter::All).unwrap().len(), 2);
    }

    #[test]
    fn renumber_onto_taken_number_fails() {
        let (store, _, _) = store();
        store.create_attempt(&activity(), 1, &data(), None).unwrap();
        store.create_attempt(&activity(), 2, &data(), None).unwrap();
        let err = store.change_attempt_number(SCORM, 1, 2).unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[test]
    fn renumber_unknown_attempt() {
        let (store, _, _) = store();
        assert!(matches!(
            store.change_attempt_number(SCORM, 9, 10),
            Err(OfflineError::AttemptNotFound { attempt: 9, .. })
        ));
    }

    #[test]
    fn snapshot_set_and_clear() {
        let (store, _, _) = store();
        store.create_attempt(&activity(), 1, &data(), None).unwrap();
        assert_eq!(store.snapshot(SCORM, 1).unwrap(), None);

        store.set_snapshot(SCORM, 1, Some(&data())).unwrap();
        assert!(store.snapshot(SCORM, 1).unwrap().is_some());

        store.set_snapshot(SCORM, 1, None).unwrap();
        assert_eq!(store.snapshot(SCORM, 1).unwrap(), None);
        assert!(store.set_snapshot(SCORM, 7, None).is_err());
    }

    #[test]
    fn delete_and_listing() {
        let (store, _, _) = store();
        store.create_attempt(&activity(), 1, &data(), None).unwrap();
        store.create_attempt(&activity(), 2, &data(), None).unwrap();
        store.create_attempt(&ActivityConfig::new(11, 1), 1, &data(), None).unwrap();

        let numbers: Vec<_> = store.attempts(SCORM).unwrap().iter().map(|a| a.attempt).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(store.all_attempts().unwrap().len(), 3);

        store.delete_attempt(SCORM, 1).unwrap();
        assert_eq!(store.attempts(SCORM).unwrap().len(), 1);
        assert!(store.stored_data(SCORM, 1, SyncedFilter::All).unwrap().is_empty());
        assert_eq!(store.creation_time(SCORM, 2).unwrap(), Some(1_000));
        assert_eq!(store.creation_time(SCORM, 1).unwrap(), None);
    }

    #[test]
    fn decodes_non_string_json() {
        assert_eq!(decode_value(Some("12")).unwrap(), "12");
        assert_eq!(decode_value(Some("null")).unwrap(), "");
        assert_eq!(decode_value(None).unwrap(), "");
        assert!(decode_value(Some("{")).is_err());
    }
}
