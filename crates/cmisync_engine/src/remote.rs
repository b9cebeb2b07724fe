//! The remote LMS as seen by the sync engine.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use cmisync_model::{
    normalize_status, ActivityConfig, AttemptNumber, CourseId, DataEntry, ScoId, ScoUserData,
    ScormId, UserDataMap,
};
use parking_lot::Mutex;

use crate::error::{RemoteError, RemoteResult};

/// The authoritative store of attempts.
///
/// This trait abstracts the web service layer, allowing for different
/// implementations (HTTP client, in-process LMS, mock for testing).
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Stores tracks of one SCO in an attempt, creating the attempt if the
    /// remote does not know it yet.
    async fn submit_tracks(
        &self,
        scorm_id: ScormId,
        sco_id: ScoId,
        attempt: AttemptNumber,
        tracks: &[DataEntry],
    ) -> RemoteResult<()>;

    /// Returns the data of an attempt. With `ignore_cache` the value must
    /// come from the remote itself.
    async fn fetch_user_data(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
        ignore_cache: bool,
    ) -> RemoteResult<UserDataMap>;

    /// Returns the numbers of the learner's online attempts.
    async fn fetch_attempt_inventory(&self, scorm_id: ScormId) -> RemoteResult<Vec<AttemptNumber>>;

    /// Returns the configuration of an activity.
    async fn fetch_activity(
        &self,
        course_id: CourseId,
        scorm_id: ScormId,
    ) -> RemoteResult<ActivityConfig>;
}

/// One call to [`RemoteService::submit_tracks`] seen by a [`MockRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Activity id.
    pub scorm_id: ScormId,
    /// SCO id.
    pub sco_id: ScoId,
    /// Attempt number.
    pub attempt: AttemptNumber,
    /// Submitted tracks.
    pub tracks: Vec<DataEntry>,
}

#[derive(Debug, Default)]
struct MockState {
    activities: HashMap<ScormId, ActivityConfig>,
    attempts: BTreeMap<(ScormId, AttemptNumber), UserDataMap>,
    rejected: HashSet<(ScormId, ScoId)>,
    failing: HashSet<(ScormId, ScoId)>,
    submissions: Vec<Submission>,
    inventory_requests: usize,
}

/// An in-memory remote for testing.
///
/// Submitted tracks are applied to the stored attempt, so later fetches
/// observe them.
#[derive(Debug)]
pub struct MockRemote {
    reachable: AtomicBool,
    state: Mutex<MockState>,
}

impl MockRemote {
    /// Creates a reachable mock with no data.
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Registers an activity.
    pub fn add_activity(&self, activity: ActivityConfig) {
        self.state.lock().activities.insert(activity.scorm_id, activity);
    }

    /// Replaces the data of an online attempt.
    pub fn set_attempt(&self, scorm_id: ScormId, attempt: AttemptNumber, data: UserDataMap) {
        self.state.lock().attempts.insert((scorm_id, attempt), data);
    }

    /// Changes one value of an online attempt, as if the learner used
    /// another device.
    pub fn set_value(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
        sco_id: ScoId,
        element: &str,
        value: &str,
    ) {
        let mut state = self.state.lock();
        let data = state.attempts.entry((scorm_id, attempt)).or_default();
        apply(data, sco_id, element, value);
    }

    /// Returns the data of an online attempt.
    pub fn attempt_data(&self, scorm_id: ScormId, attempt: AttemptNumber) -> Option<UserDataMap> {
        self.state.lock().attempts.get(&(scorm_id, attempt)).cloned()
    }

    /// Makes every call fail with [`RemoteError::Unreachable`].
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Makes submissions for a SCO fail with [`RemoteError::Rejected`].
    pub fn reject_sco(&self, scorm_id: ScormId, sco_id: ScoId) {
        self.state.lock().rejected.insert((scorm_id, sco_id));
    }

    /// Makes submissions for a SCO fail with [`RemoteError::Unreachable`].
    pub fn fail_sco(&self, scorm_id: ScormId, sco_id: ScoId) {
        self.state.lock().failing.insert((scorm_id, sco_id));
    }

    /// Removes every rejection and failure set on SCOs.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.rejected.clear();
        state.failing.clear();
    }

    /// Returns every accepted submission, in order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    /// Returns how many times the attempt inventory was requested.
    pub fn inventory_requests(&self) -> usize {
        self.state.lock().inventory_requests
    }

    fn check_reachable(&self) -> RemoteResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::unreachable("mock remote is offline"))
        }
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(data: &mut UserDataMap, sco_id: ScoId, element: &str, value: &str) {
    let sco = data
        .entry(sco_id)
        .or_insert_with(|| ScoUserData::new(sco_id));
    sco.userdata.insert(element.to_string(), value.to_string());
    match element {
        "cmi.core.lesson_status" => {
            sco.userdata.insert("status".into(), normalize_status(value));
        }
        "cmi.core.score.raw" => {
            sco.userdata.insert("score_raw".into(), value.to_string());
        }
        _ => {}
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn submit_tracks(
        &self,
        scorm_id: ScormId,
        sco_id: ScoId,
        attempt: AttemptNumber,
        tracks: &[DataEntry],
    ) -> RemoteResult<()> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        if state.rejected.contains(&(scorm_id, sco_id)) {
            return Err(RemoteError::rejected(format!("sco {sco_id} refused the tracks")));
        }
        if state.failing.contains(&(scorm_id, sco_id)) {
            return Err(RemoteError::unreachable(format!("sco {sco_id} timed out")));
        }

        let data = state.attempts.entry((scorm_id, attempt)).or_default();
        for track in tracks {
            apply(data, sco_id, &track.element, &track.value);
        }
        state.submissions.push(Submission {
            scorm_id,
            sco_id,
            attempt,
            tracks: tracks.to_vec(),
        });
        Ok(())
    }

    async fn fetch_user_data(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
        _ignore_cache: bool,
    ) -> RemoteResult<UserDataMap> {
        self.check_reachable()?;
        Ok(self
            .state
            .lock()
            .attempts
            .get(&(scorm_id, attempt))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_attempt_inventory(&self, scorm_id: ScormId) -> RemoteResult<Vec<AttemptNumber>> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        state.inventory_requests += 1;
        Ok(state
            .attempts
            .keys()
            .filter(|(id, _)| *id == scorm_id)
            .map(|(_, attempt)| *attempt)
            .collect())
    }

    async fn fetch_activity(
        &self,
        _course_id: CourseId,
        scorm_id: ScormId,
    ) -> RemoteResult<ActivityConfig> {
        self.check_reachable()?;
        self.state
            .lock()
            .activities
            .get(&scorm_id)
            .cloned()
            .ok_or_else(|| RemoteError::rejected(format!("unknown activity {scorm_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submissions_update_attempt_data() {
        let remote = MockRemote::new();
        remote
            .submit_tracks(1, 5, 2, &[DataEntry::new("cmi.core.lesson_status", "not attempted")])
            .await
            .unwrap();

        let data = remote.fetch_user_data(1, 2, true).await.unwrap();
        assert_eq!(data[&5].userdata["status"], "notattempted");
        assert_eq!(remote.fetch_attempt_inventory(1).await.unwrap(), vec![2]);
        assert_eq!(remote.submissions().len(), 1);
    }

    #[tokio::test]
    async fn mock_remote_not_reachable_error() {
        let remote = MockRemote::new();
        remote.set_reachable(false);
        let err = remote.fetch_attempt_inventory(1).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn rejected_sco_is_not_applied() {
        let remote = MockRemote::new();
        remote.reject_sco(1, 5);
        let err = remote
            .submit_tracks(1, 5, 1, &[DataEntry::new("cmi.core.exit", "suspend")])
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(_)));
        assert!(remote.attempt_data(1, 1).is_none());
    }

    #[tokio::test]
    async fn unknown_activity_is_rejected() {
        let remote = MockRemote::new();
        remote.add_activity(ActivityConfig::new(4, 1));
        assert_eq!(remote.fetch_activity(1, 4).await.unwrap().scorm_id, 4);
        assert!(remote.fetch_activity(1, 5).await.is_err());
    }
}
