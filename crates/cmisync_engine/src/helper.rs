//! Preparing offline attempts from online data.

use std::collections::BTreeSet;

use cmisync_model::{is_dotted, ActivityConfig, AttemptNumber, ScoUserData, UserDataMap};
use cmisync_offline::{OfflineStore, SyncedFilter, TrackTarget};
use tracing::info;

use crate::error::SyncResult;
use crate::remote::RemoteService;

/// Creates offline attempt `attempt` based on online attempt `last_online`.
///
/// Every element the online attempt tracked is copied with an empty value,
/// so the new attempt starts fresh but covers the same SCOs. The online data
/// becomes the attempt snapshot. With `last_online == 0` the attempt starts
/// empty.
pub async fn create_offline_attempt<R>(
    store: &OfflineStore,
    remote: &R,
    activity: &ActivityConfig,
    attempt: AttemptNumber,
    last_online: AttemptNumber,
) -> SyncResult<()>
where
    R: RemoteService + ?Sized,
{
    let online = if last_online > 0 {
        remote
            .fetch_user_data(activity.scorm_id, last_online, false)
            .await?
    } else {
        UserDataMap::new()
    };

    let blank: UserDataMap = online
        .iter()
        .map(|(&sco_id, sco)| {
            let userdata = sco
                .dotted()
                .map(|(element, _)| (element.clone(), String::new()))
                .collect();
            (
                sco_id,
                ScoUserData {
                    sco_id,
                    userdata,
                    defaultdata: sco.defaultdata.clone(),
                },
            )
        })
        .collect();

    store.create_attempt(activity, attempt, &blank, Some(&online))?;
    info!(
        scorm_id = activity.scorm_id,
        attempt, last_online, "created offline attempt"
    );
    Ok(())
}

/// Copies online attempt `attempt` into the offline store so it can be
/// continued without a connection.
///
/// Elements that already have an offline value keep it. The online data
/// becomes the attempt snapshot, which later lets the sync engine detect
/// whether the online attempt moved on in the meantime.
pub async fn convert_attempt_to_offline<R>(
    store: &OfflineStore,
    remote: &R,
    activity: &ActivityConfig,
    attempt: AttemptNumber,
) -> SyncResult<()>
where
    R: RemoteService + ?Sized,
{
    let scorm_id = activity.scorm_id;
    let online = remote.fetch_user_data(scorm_id, attempt, false).await?;

    let existing: BTreeSet<(u64, String)> = store
        .stored_data(scorm_id, attempt, SyncedFilter::All)?
        .into_iter()
        .map(|track| (track.sco_id, track.element))
        .collect();

    if store.attempt(scorm_id, attempt)?.is_none() {
        store.create_attempt(activity, attempt, &online, Some(&online))?;
    } else {
        for (&sco_id, sco) in &online {
            let target = TrackTarget {
                scorm_id,
                sco_id,
                attempt,
            };
            for (element, value) in &sco.userdata {
                if !is_dotted(element) || existing.contains(&(sco_id, element.clone())) {
                    continue;
                }
                store.insert_track(target, element, Some(value), false, &sco.userdata)?;
            }
        }
        store.set_snapshot(scorm_id, attempt, Some(&online))?;
    }

    info!(scorm_id, attempt, "online attempt copied offline");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use cmisync_model::ScoInfo;
    use cmisync_storage::InMemoryBackend;
    use std::sync::Arc;

    fn activity() -> ActivityConfig {
        ActivityConfig::new(7, 1).with_scos(vec![ScoInfo::new(1, "a.html")])
    }

    fn remote_with_attempt() -> MockRemote {
        let remote = MockRemote::new();
        remote.set_value(7, 1, 1, "cmi.core.lesson_status", "incomplete");
        remote.set_value(7, 1, 1, "cmi.core.lesson_location", "page3");
        remote
    }

    #[tokio::test]
    async fn new_attempt_blanks_online_values() {
        let store = OfflineStore::new(Arc::new(InMemoryBackend::new()), 2);
        let remote = remote_with_attempt();

        create_offline_attempt(&store, &remote, &activity(), 2, 1)
            .await
            .unwrap();

        let tracks = store.stored_data(7, 2, SyncedFilter::All).unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks.iter().all(|t| t.value.is_empty()));
        let snapshot = store.snapshot(7, 2).unwrap().unwrap();
        assert_eq!(snapshot[&1].userdata["cmi.core.lesson_location"], "page3");
    }

    #[tokio::test]
    async fn first_attempt_starts_empty() {
        let store = OfflineStore::new(Arc::new(InMemoryBackend::new()), 2);
        let remote = MockRemote::new();

        create_offline_attempt(&store, &remote, &activity(), 1, 0)
            .await
            .unwrap();

        assert!(store.attempt(7, 1).unwrap().is_some());
        assert!(store.stored_data(7, 1, SyncedFilter::All).unwrap().is_empty());
    }

    #[tokio::test]
    async fn conversion_keeps_offline_values() {
        let store = OfflineStore::new(Arc::new(InMemoryBackend::new()), 2);
        let remote = remote_with_attempt();
        let activity = activity();

        convert_attempt_to_offline(&store, &remote, &activity, 1)
            .await
            .unwrap();
        let target = TrackTarget {
            scorm_id: 7,
            sco_id: 1,
            attempt: 1,
        };
        store
            .insert_track(target, "cmi.core.lesson_location", Some("page9"), false, &Default::default())
            .unwrap();

        remote.set_value(7, 1, 1, "cmi.suspend_data", "x=1");
        convert_attempt_to_offline(&store, &remote, &activity, 1)
            .await
            .unwrap();

        let tracks = store.stored_data(7, 1, SyncedFilter::All).unwrap();
        let value = |element: &str| {
            tracks
                .iter()
                .find(|t| t.element == element)
                .map(|t| t.value.clone())
        };
        assert_eq!(value("cmi.core.lesson_location").as_deref(), Some("page9"));
        assert_eq!(value("cmi.suspend_data").as_deref(), Some("x=1"));
        assert!(value("status").is_none());

        let snapshot = store.snapshot(7, 1).unwrap().unwrap();
        assert_eq!(snapshot[&1].userdata["cmi.suspend_data"], "x=1");
    }
}
