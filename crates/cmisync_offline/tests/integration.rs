//! Integration tests for the offline store.

use std::sync::Arc;

use cmisync_model::{
    ActivityConfig, DataModel, LearnerIdentity, Persistence, ScoInfo, SessionConfig, UserDataMap,
};
use cmisync_offline::{ManualClock, OfflineStore, SyncedFilter};
use cmisync_storage::SqliteBackend;
use tempfile::tempdir;

fn learner() -> LearnerIdentity {
    LearnerIdentity {
        user_id: 3,
        student_id: "alex".into(),
        student_name: "Smith, Alex".into(),
    }
}

fn activity() -> Arc<ActivityConfig> {
    Arc::new(
        ActivityConfig::new(20, 4)
            .with_force_completed(true)
            .with_scos(vec![ScoInfo::new(1, "sco1.html"), ScoInfo::new(2, "sco2.html")]),
    )
}

fn session(store: &Arc<OfflineStore>, data: &UserDataMap) -> DataModel {
    DataModel::new(
        activity(),
        SessionConfig::new(1, 1).with_offline(true),
        data,
        Persistence::offline_only(store.clone()),
    )
}

#[test]
fn offline_session_survives_reopen_and_resumes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("offline.db");
    let clock = Arc::new(ManualClock::new(500));

    {
        let backend = Arc::new(SqliteBackend::open(&path).unwrap());
        let store = Arc::new(OfflineStore::new(backend, 3).with_clock(clock.clone()));
        let data = store.user_data(20, 1, &activity().scos, &learner()).unwrap();

        let mut model = session(&store, &data);
        assert_eq!(model.initialize(""), "true");
        assert_eq!(model.get_value("cmi.core.entry"), "ab-initio");
        model.set_value("cmi.core.lesson_status", "incomplete");
        model.set_value("cmi.core.exit", "suspend");
        model.set_value("cmi.suspend_data", "page=4");
        model.set_value("cmi.core.session_time", "00:01:30");
        assert_eq!(model.commit(""), "true");
        assert_eq!(model.finish(""), "true");
    }

    let backend = Arc::new(SqliteBackend::open(&path).unwrap());
    let store = Arc::new(OfflineStore::new(backend, 3));
    assert_eq!(store.attempts(20).unwrap().len(), 1);

    let data = store.user_data(20, 1, &activity().scos, &learner()).unwrap();
    assert_eq!(data[&1].userdata["status"], "incomplete");
    assert_eq!(data[&1].defaultdata["cmi.core.entry"], "resume");
    assert_eq!(data[&1].defaultdata["cmi.core.total_time"], "00:01:30");
    assert_eq!(data[&2].defaultdata["cmi.core.entry"], "ab-initio");

    let mut model = session(&store, &data);
    model.initialize("");
    assert_eq!(model.get_value("cmi.suspend_data"), "page=4");
    assert_eq!(model.get_value("cmi.core.student_name"), "Smith, Alex");
}

#[test]
fn force_completed_applies_through_the_runtime() {
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let store = Arc::new(OfflineStore::new(backend, 3));
    let data = store.user_data(20, 1, &activity().scos, &learner()).unwrap();

    let mut model = session(&store, &data);
    model.initialize("");
    model.set_value("cmi.core.lesson_status", "incomplete");
    model.commit("");
    model.set_value("cmi.core.score.raw", "75");
    model.commit("");

    let tracks = store.stored_data(20, 1, SyncedFilter::OnlyUnsynced).unwrap();
    let status = tracks
        .iter()
        .find(|t| t.element == "cmi.core.lesson_status")
        .map(|t| t.value.as_str());
    assert_eq!(status, Some("completed"));
}

#[test]
fn renumbered_attempt_keeps_its_data() {
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let store = OfflineStore::new(backend, 3);
    let data = store.user_data(20, 1, &activity().scos, &learner()).unwrap();
    let mut filled = data.clone();
    if let Some(sco) = filled.get_mut(&1) {
        sco.userdata.insert("cmi.core.lesson_location".into(), "p7".into());
    }

    store.create_attempt(&activity(), 2, &filled, Some(&data)).unwrap();
    store.mark_synced(20, 2, 1).unwrap();
    let receipt = store.change_attempt_number(20, 2, 5).unwrap();
    assert_eq!(receipt.synced_tracks.len(), store.stored_data(20, 5, SyncedFilter::All).unwrap().len());

    let moved = store.stored_data(20, 5, SyncedFilter::OnlyUnsynced).unwrap();
    assert!(moved
        .iter()
        .any(|t| t.element == "cmi.core.lesson_location" && t.value == "p7"));
    assert!(store.snapshot(20, 5).unwrap().is_some());
}
