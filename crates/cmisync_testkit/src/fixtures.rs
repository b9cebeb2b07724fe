//! Test fixtures for stores, user data and the remote.

use std::path::PathBuf;
use std::sync::Arc;

use cmisync_engine::{MockRemote, SyncConfig, SyncEngine};
use cmisync_model::{
    ActivityConfig, AttemptNumber, ScoId, ScoInfo, ScoUserData, ScormId, UserDataMap, UserId,
};
use cmisync_offline::{ManualClock, OfflineStore, TrackTarget};
use cmisync_storage::{InMemoryBackend, SqliteBackend};
use tempfile::TempDir;

/// Start time of every fixture clock.
pub const FIXTURE_START_TIME: i64 = 1_700_000_000;

/// An offline store with a manual clock and automatic cleanup.
pub struct TestStore {
    /// The store.
    pub store: Arc<OfflineStore>,
    /// The store's clock.
    pub clock: Arc<ManualClock>,
    memory: Option<Arc<InMemoryBackend>>,
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a store on an in-memory backend.
    pub fn memory(user_id: UserId) -> Self {
        let backend = Arc::new(InMemoryBackend::new());
        let clock = Arc::new(ManualClock::new(FIXTURE_START_TIME));
        let store = OfflineStore::new(backend.clone(), user_id).with_clock(clock.clone());
        Self {
            store: Arc::new(store),
            clock,
            memory: Some(backend),
            _temp_dir: None,
        }
    }

    /// Creates a store on a SQLite file in a temporary directory.
    pub fn sqlite(user_id: UserId) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backend = SqliteBackend::open(temp_dir.path().join("offline.db"))
            .expect("Failed to open SQLite store");
        let clock = Arc::new(ManualClock::new(FIXTURE_START_TIME));
        let store = OfflineStore::new(Arc::new(backend), user_id).with_clock(clock.clone());
        Self {
            store: Arc::new(store),
            clock,
            memory: None,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the in-memory backend, for failure injection.
    pub fn memory_backend(&self) -> Option<&Arc<InMemoryBackend>> {
        self.memory.as_ref()
    }

    /// Returns the store file if SQLite based.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("offline.db"))
    }

    /// Returns the learner's offline attempt numbers of an activity.
    pub fn attempt_numbers(&self, scorm_id: ScormId) -> Vec<AttemptNumber> {
        self.store
            .attempts(scorm_id)
            .expect("Failed to list attempts")
            .into_iter()
            .map(|a| a.attempt)
            .collect()
    }
}

impl std::ops::Deref for TestStore {
    type Target = OfflineStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Builds [`UserDataMap`] values SCO by SCO.
#[derive(Debug, Default)]
pub struct UserDataBuilder {
    data: UserDataMap,
    current: ScoId,
}

impl UserDataBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a SCO and directs further values to it.
    pub fn sco(mut self, sco_id: ScoId) -> Self {
        self.data
            .entry(sco_id)
            .or_insert_with(|| ScoUserData::new(sco_id));
        self.current = sco_id;
        self
    }

    /// Sets a value of the current SCO.
    pub fn value(mut self, element: &str, value: &str) -> Self {
        let sco_id = self.current;
        self.data
            .entry(sco_id)
            .or_insert_with(|| ScoUserData::new(sco_id))
            .userdata
            .insert(element.to_string(), value.to_string());
        self
    }

    /// Sets a launch default of the current SCO.
    pub fn default_value(mut self, element: &str, value: &str) -> Self {
        let sco_id = self.current;
        self.data
            .entry(sco_id)
            .or_insert_with(|| ScoUserData::new(sco_id))
            .defaultdata
            .insert(element.to_string(), value.to_string());
        self
    }

    /// Sets `cmi.core.lesson_status` and the `status` bookkeeping key.
    pub fn status(self, status: &str) -> Self {
        self.value("cmi.core.lesson_status", status)
            .value("status", status)
    }

    /// Returns the built data.
    pub fn build(self) -> UserDataMap {
        self.data
    }
}

/// Creates an activity with `sco_count` launchable SCOs numbered from 1.
pub fn activity(scorm_id: ScormId, sco_count: u64) -> ActivityConfig {
    let scos = (1..=sco_count)
        .map(|id| ScoInfo::new(id, format!("sco{id}.html")))
        .collect();
    ActivityConfig::new(scorm_id, 1).with_scos(scos)
}

/// Stores `data` as an online attempt, applying values one by one.
pub fn seed_remote(remote: &MockRemote, scorm_id: ScormId, attempt: AttemptNumber, data: &UserDataMap) {
    for (&sco_id, sco) in data {
        for (element, value) in sco.dotted() {
            remote.set_value(scorm_id, attempt, sco_id, element, value);
        }
    }
}

/// A store, a mock remote and a sync engine over both.
pub struct SyncHarness {
    /// The offline side.
    pub store: TestStore,
    /// The remote side.
    pub remote: Arc<MockRemote>,
    /// The engine.
    pub engine: Arc<SyncEngine<MockRemote>>,
    /// The activity under test, registered with the remote.
    pub activity: ActivityConfig,
}

impl SyncHarness {
    /// Creates a harness with the default sync configuration.
    pub fn new(activity: ActivityConfig) -> Self {
        Self::with_config(activity, SyncConfig::default())
    }

    /// Creates a harness with `config`.
    pub fn with_config(activity: ActivityConfig, config: SyncConfig) -> Self {
        let store = TestStore::memory(2);
        let remote = Arc::new(MockRemote::new());
        remote.add_activity(activity.clone());
        let engine = Arc::new(SyncEngine::new(config, store.store.clone(), remote.clone()));
        Self {
            store,
            remote,
            engine,
            activity,
        }
    }

    /// Creates an offline attempt whose first SCO has `status`, then moves
    /// the clock on.
    pub fn offline_attempt(&self, attempt: AttemptNumber, status: &str) {
        self.offline_attempt_with_snapshot(attempt, status, None);
    }

    /// Like [`Self::offline_attempt`], recording `snapshot` as the remote
    /// state it was started from.
    pub fn offline_attempt_with_snapshot(
        &self,
        attempt: AttemptNumber,
        status: &str,
        snapshot: Option<&UserDataMap>,
    ) {
        self.store
            .create_attempt(&self.activity, attempt, &UserDataMap::new(), snapshot)
            .expect("Failed to create attempt");
        let target = TrackTarget {
            scorm_id: self.activity.scorm_id,
            sco_id: 1,
            attempt,
        };
        self.store
            .insert_track(
                target,
                "cmi.core.lesson_status",
                Some(status),
                false,
                &Default::default(),
            )
            .expect("Failed to write track");
        self.store.clock.advance(30);
    }

    /// Stores an online attempt whose first SCO has `status`.
    pub fn online_attempt(&self, attempt: AttemptNumber, status: &str) {
        self.remote.set_value(
            self.activity.scorm_id,
            attempt,
            1,
            "cmi.core.lesson_status",
            status,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmisync_offline::SyncedFilter;

    #[test]
    fn builder_groups_values_by_sco() {
        let data = UserDataBuilder::new()
            .sco(1)
            .status("incomplete")
            .sco(2)
            .value("cmi.core.lesson_location", "p4")
            .default_value("cmi.core.entry", "resume")
            .build();
        assert_eq!(data[&1].userdata["status"], "incomplete");
        assert_eq!(data[&2].userdata["cmi.core.lesson_location"], "p4");
        assert_eq!(data[&2].defaultdata["cmi.core.entry"], "resume");
    }

    #[test]
    fn sqlite_store_lives_in_temp_dir() {
        let store = TestStore::sqlite(4);
        assert!(store.path().unwrap().exists());
        assert!(store.memory_backend().is_none());
    }

    #[test]
    fn harness_attempts_advance_clock() {
        let harness = SyncHarness::new(activity(3, 1));
        harness.offline_attempt(1, "completed");
        harness.offline_attempt(2, "completed");

        let first = harness.store.creation_time(3, 1).unwrap().unwrap();
        let second = harness.store.creation_time(3, 2).unwrap().unwrap();
        assert!(second > first);
        assert_eq!(
            harness.store.stored_data(3, 2, SyncedFilter::All).unwrap().len(),
            1
        );
    }

    #[test]
    fn seeding_skips_bookkeeping_keys() {
        let remote = MockRemote::new();
        let data = UserDataBuilder::new().sco(1).status("passed").build();
        seed_remote(&remote, 9, 1, &data);
        let stored = remote.attempt_data(9, 1).unwrap();
        assert_eq!(stored[&1].userdata["cmi.core.lesson_status"], "passed");
        assert_eq!(stored[&1].userdata["status"], "passed");
    }
}
