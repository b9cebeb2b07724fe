//! The sync engine.
//!
//! A pass over one activity runs these steps:
//!
//! 1. Compare the online attempt inventory with the offline attempts.
//! 2. Without collisions, send every offline attempt unless the last online
//!    attempt is still open.
//! 3. Resolve each collision: sync it in place, delete leftovers of a sync
//!    that already succeeded, or turn it into a new attempt.
//! 4. Renumber the new attempts, shifting later offline attempts so their
//!    order is kept.
//! 5. Send the renumbered attempts that may be sent now.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use cmisync_model::{
    is_attempt_incomplete, is_dotted, ActivityConfig, AttemptNumber, DataEntry, LearnerIdentity,
    ScoId, ScoUserData, ScormId,
};
use cmisync_offline::{OfflineStore, RenumberReceipt, SyncedFilter, COMPONENT};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{BlockedPolicy, SyncConfig};
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::remote::RemoteService;
use crate::report::{ActivitySync, SyncReport, SyncWarning};
use crate::resolver::AttemptInventory;
use crate::snapshot::snapshot_equals;

/// A sync pass that may be awaited by several callers.
pub type SyncFuture = Shared<BoxFuture<'static, SyncResult<SyncReport>>>;

/// The sync state of one activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No pass has run yet.
    #[default]
    Idle,
    /// Waiting for an offline operation to release the activity.
    Waiting,
    /// A pass is running.
    Syncing,
    /// The last pass completed.
    Synced,
    /// The last pass failed.
    Error,
}

impl SyncState {
    /// Returns true while a pass is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Waiting | SyncState::Syncing)
    }
}

/// Statistics about sync passes.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Passes that completed.
    pub passes_completed: u64,
    /// Passes that failed.
    pub passes_failed: u64,
    /// Attempts sent and removed from the offline store.
    pub attempts_synced: u64,
    /// Attempts given a new number.
    pub attempts_renumbered: u64,
    /// Attempts deleted because their data could not be kept.
    pub attempts_discarded: u64,
    /// Tracks accepted by the remote.
    pub tracks_sent: u64,
    /// Store time of the last finished pass.
    pub last_sync_time: Option<i64>,
    /// Last error message.
    pub last_error: Option<String>,
}

enum AttemptOutcome {
    Synced { sent: bool },
    Discarded { sent: bool, reason: String },
    Kept { sent: bool, error: String },
}

/// Online state captured before collisions are resolved.
struct Baseline {
    online_count: usize,
    last_online: AttemptNumber,
    last_online_was_finished: bool,
}

#[derive(Default)]
struct RenumberPlan {
    /// Attempts slotted after the last online attempt, keeping their order.
    same_order: Vec<AttemptNumber>,
    /// Attempts appended past every attempt in use, keyed by creation time.
    at_end: Vec<(i64, AttemptNumber)>,
}

/// Reconciles offline attempts with the remote.
pub struct SyncEngine<R: RemoteService> {
    config: SyncConfig,
    store: Arc<OfflineStore>,
    remote: Arc<R>,
    states: RwLock<HashMap<ScormId, SyncState>>,
    stats: RwLock<SyncStats>,
    sync_times: RwLock<HashMap<ScormId, i64>>,
    ongoing: Mutex<HashMap<ScormId, SyncFuture>>,
}

impl<R: RemoteService + 'static> SyncEngine<R> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, store: Arc<OfflineStore>, remote: Arc<R>) -> Self {
        Self {
            config,
            store,
            remote,
            states: RwLock::new(HashMap::new()),
            stats: RwLock::new(SyncStats::default()),
            sync_times: RwLock::new(HashMap::new()),
            ongoing: Mutex::new(HashMap::new()),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the offline store.
    pub fn store(&self) -> &Arc<OfflineStore> {
        &self.store
    }

    /// Gets the remote.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Gets the state of an activity.
    pub fn state(&self, scorm_id: ScormId) -> SyncState {
        self.states.read().get(&scorm_id).copied().unwrap_or_default()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns when the last pass over the activity finished.
    pub fn last_sync_time(&self, scorm_id: ScormId) -> Option<i64> {
        self.sync_times.read().get(&scorm_id).copied()
    }

    /// Returns true if the activity was not synced within the sync interval.
    pub fn is_sync_needed(&self, scorm_id: ScormId) -> bool {
        let Some(last) = self.last_sync_time(scorm_id) else {
            return true;
        };
        let interval = i64::try_from(self.config.sync_interval.as_secs()).unwrap_or(i64::MAX);
        self.store.now().saturating_sub(last) >= interval
    }

    fn set_state(&self, scorm_id: ScormId, state: SyncState) {
        self.states.write().insert(scorm_id, state);
    }

    /// Syncs one activity.
    ///
    /// The pass is registered before this returns: a second call for the
    /// same activity while it runs gets the same pass instead of starting
    /// another one.
    pub fn sync_activity(self: &Arc<Self>, activity: &ActivityConfig) -> SyncFuture {
        let scorm_id = activity.scorm_id;
        let mut ongoing = self.ongoing.lock();
        if let Some(pass) = ongoing.get(&scorm_id) {
            debug!(scorm_id, "joining sync pass in progress");
            return pass.clone();
        }

        let engine = Arc::clone(self);
        let activity = activity.clone();
        let pass = async move { engine.run_pass(activity).await }
            .boxed()
            .shared();
        ongoing.insert(scorm_id, pass.clone());
        pass
    }

    /// Syncs the activity if the sync interval has passed since its last
    /// pass. Returns `None` when no pass was needed.
    pub async fn sync_if_needed(
        self: &Arc<Self>,
        activity: &ActivityConfig,
    ) -> SyncResult<Option<SyncReport>> {
        if !self.is_sync_needed(activity.scorm_id) {
            debug!(scorm_id = activity.scorm_id, "sync not needed yet");
            return Ok(None);
        }
        self.sync_activity(activity).await.map(Some)
    }

    /// Syncs every activity that has offline attempts of this learner.
    ///
    /// Blocked activities are skipped. Without `force`, activities synced
    /// within the sync interval are skipped too. A failing activity does not
    /// stop the others.
    pub async fn sync_all(self: &Arc<Self>, force: bool) -> SyncResult<Vec<ActivitySync>> {
        let user_id = self.store.user_id();
        let mut seen = BTreeSet::new();
        let mut outcomes = Vec::new();

        for attempt in self.store.all_attempts()? {
            if attempt.user_id != user_id || !seen.insert(attempt.scorm_id) {
                continue;
            }
            let scorm_id = attempt.scorm_id;
            if self.store.locks().is_blocked(COMPONENT, scorm_id) {
                debug!(scorm_id, "skipping blocked activity");
                continue;
            }

            let activity = match self.remote.fetch_activity(attempt.course_id, scorm_id).await {
                Ok(activity) => activity,
                Err(err) => {
                    warn!(scorm_id, error = %err, "could not load activity for sync");
                    outcomes.push(ActivitySync {
                        scorm_id,
                        result: Err(err.into()),
                    });
                    continue;
                }
            };

            let result = if force {
                self.sync_activity(&activity).await.map(Some)
            } else {
                self.sync_if_needed(&activity).await
            };
            match result {
                Ok(None) => {}
                Ok(Some(report)) => outcomes.push(ActivitySync {
                    scorm_id,
                    result: Ok(report),
                }),
                Err(err) => outcomes.push(ActivitySync {
                    scorm_id,
                    result: Err(err),
                }),
            }
        }
        Ok(outcomes)
    }

    async fn run_pass(self: Arc<Self>, activity: ActivityConfig) -> SyncResult<SyncReport> {
        let scorm_id = activity.scorm_id;
        let result = match self.wait_until_unblocked(scorm_id).await {
            Ok(()) => {
                self.set_state(scorm_id, SyncState::Syncing);
                self.perform_sync(&activity).await
            }
            Err(err) => Err(err),
        };
        self.ongoing.lock().remove(&scorm_id);

        match &result {
            Ok(report) => {
                self.set_state(scorm_id, SyncState::Synced);
                self.stats.write().passes_completed += 1;
                info!(
                    scorm_id,
                    warnings = report.warnings.len(),
                    updated = report.updated,
                    attempt_finished = report.attempt_finished,
                    "sync pass finished"
                );
            }
            Err(err) => {
                self.set_state(scorm_id, SyncState::Error);
                let mut stats = self.stats.write();
                stats.passes_failed += 1;
                stats.last_error = Some(err.to_string());
                drop(stats);
                warn!(scorm_id, error = %err, "sync pass failed");
            }
        }
        result
    }

    async fn wait_until_unblocked(&self, scorm_id: ScormId) -> SyncResult<()> {
        if !self.store.locks().is_blocked(COMPONENT, scorm_id) {
            return Ok(());
        }
        let BlockedPolicy::Wait { timeout } = self.config.blocked else {
            debug!(scorm_id, "cannot sync a blocked activity");
            return Err(SyncError::Blocked { scorm_id });
        };

        self.set_state(scorm_id, SyncState::Waiting);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut retry = 0;
        while self.store.locks().is_blocked(COMPONENT, scorm_id) {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                debug!(scorm_id, "gave up waiting for a blocked activity");
                return Err(SyncError::Blocked { scorm_id });
            }
            retry += 1;
            let delay = self.config.retry.delay_for_attempt(retry).min(deadline - now);
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn perform_sync(&self, activity: &ActivityConfig) -> SyncResult<SyncReport> {
        let scorm_id = activity.scorm_id;
        let mut warnings = Vec::new();
        let mut updated = false;
        debug!(scorm_id, "syncing activity");

        let online = self.remote.fetch_attempt_inventory(scorm_id).await?;
        let offline = self.store.attempts(scorm_id)?.into_iter().map(|a| a.attempt);
        let inventory = AttemptInventory::from_numbers(online, offline);

        if inventory.offline.is_empty() {
            debug!(scorm_id, "no offline attempts to sync");
            return Ok(self.finish_sync(activity, warnings, false, None).await);
        }

        let last_online = inventory.last_online();
        let mut incomplete =
            last_online > 0 && self.is_online_attempt_incomplete(activity, last_online).await?;
        let baseline = Baseline {
            online_count: inventory.online.len(),
            last_online,
            last_online_was_finished: !incomplete,
        };

        let collisions = inventory.collisions();
        if collisions.is_empty() {
            if incomplete {
                warnings.push(SyncWarning::OnlineAttemptIncomplete {
                    attempt: last_online,
                });
                return Ok(self
                    .finish_sync(activity, warnings, false, Some(baseline))
                    .await);
            }

            for &attempt in &inventory.offline {
                if activity.allows_attempt(attempt) {
                    updated |= self.sync_attempt_reporting(activity, attempt, &mut warnings).await;
                }
            }
            return Ok(self
                .finish_sync(activity, warnings, updated, Some(baseline))
                .await);
        }

        self.treat_collisions(
            activity,
            &collisions,
            last_online,
            &inventory.offline,
            &mut warnings,
        )
        .await?;

        let attempts: Vec<AttemptNumber> = self
            .store
            .attempts(scorm_id)?
            .into_iter()
            .map(|a| a.attempt)
            .collect();
        if incomplete && attempts.contains(&last_online) {
            // Continued offline, so the offline copy completes it.
            incomplete = false;
        }

        let mut cannot_sync_some = false;
        for attempt in attempts {
            if !incomplete || attempt <= last_online {
                if activity.allows_attempt(attempt) {
                    updated |= self.sync_attempt_reporting(activity, attempt, &mut warnings).await;
                }
            } else {
                cannot_sync_some = true;
            }
        }
        if cannot_sync_some {
            warnings.push(SyncWarning::CannotSyncSome { last_online });
        }

        Ok(self
            .finish_sync(activity, warnings, updated, Some(baseline))
            .await)
    }

    async fn finish_sync(
        &self,
        activity: &ActivityConfig,
        warnings: Vec<SyncWarning>,
        updated: bool,
        baseline: Option<Baseline>,
    ) -> SyncReport {
        let scorm_id = activity.scorm_id;
        let now = self.store.now();
        self.sync_times.write().insert(scorm_id, now);
        self.stats.write().last_sync_time = Some(now);

        let mut report = SyncReport {
            warnings,
            attempt_finished: false,
            updated,
        };
        let Some(baseline) = baseline else {
            return report;
        };

        match self.remote.fetch_attempt_inventory(scorm_id).await {
            Ok(online) if online.len() > baseline.online_count => report.attempt_finished = true,
            Ok(_) if !baseline.last_online_was_finished && baseline.last_online > 0 => {
                match self
                    .is_online_attempt_incomplete(activity, baseline.last_online)
                    .await
                {
                    Ok(incomplete) => report.attempt_finished = !incomplete,
                    Err(err) => {
                        warn!(scorm_id, error = %err, "could not check the last online attempt");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => warn!(scorm_id, error = %err, "could not check finished attempts"),
        }
        report
    }

    async fn treat_collisions(
        &self,
        activity: &ActivityConfig,
        collisions: &[AttemptNumber],
        last_online: AttemptNumber,
        offline: &[AttemptNumber],
        warnings: &mut Vec<SyncWarning>,
    ) -> SyncResult<()> {
        let scorm_id = activity.scorm_id;
        let last_collision = collisions.iter().copied().max().unwrap_or(0);
        let last_offline = offline.iter().copied().max().unwrap_or(0);
        let last_offline_created = self
            .store
            .creation_time(scorm_id, last_offline)?
            .unwrap_or(0);
        let last_offline_incomplete = self.is_offline_attempt_incomplete(activity, last_offline)?;
        let mut plan = RenumberPlan::default();

        for &attempt in collisions {
            let synced = self
                .store
                .stored_data(scorm_id, attempt, SyncedFilter::OnlySynced)?;

            let must_renumber = if synced.is_empty() {
                match self
                    .store
                    .snapshot(scorm_id, attempt)?
                    .filter(|snapshot| !snapshot.is_empty())
                {
                    None => {
                        // Started offline, so it is a different attempt.
                        debug!(scorm_id, attempt, "collision without snapshot, renumbering");
                        plan.same_order.push(attempt);
                        continue;
                    }
                    Some(snapshot) => {
                        let remote = self
                            .remote
                            .fetch_user_data(scorm_id, attempt, attempt != last_online)
                            .await?;
                        !snapshot_equals(&snapshot, &remote)
                    }
                }
            } else {
                // A previous pass sent part of this attempt.
                let unsynced = self
                    .store
                    .stored_data(scorm_id, attempt, SyncedFilter::OnlyUnsynced)?;
                if !unsynced.iter().any(|track| is_dotted(&track.element)) {
                    debug!(scorm_id, attempt, "attempt was already sent, deleting it");
                    if let Err(err) = self.store.delete_attempt(scorm_id, attempt) {
                        warn!(scorm_id, attempt, error = %err, "could not delete sent attempt");
                    }
                    continue;
                }
                !self.can_retry_sync(scorm_id, attempt, last_online).await?
            };

            if must_renumber {
                self.add_to_new_or_delete(
                    scorm_id,
                    attempt,
                    last_offline,
                    last_offline_created,
                    last_offline_incomplete,
                    &mut plan,
                    warnings,
                )?;
            }
        }

        self.move_new_attempts(scorm_id, &plan.same_order, last_online, last_collision, offline)?;
        self.create_new_attempts_at_end(scorm_id, plan.at_end, last_online)
    }

    async fn can_retry_sync(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
        last_online: AttemptNumber,
    ) -> SyncResult<bool> {
        let remote = self
            .remote
            .fetch_user_data(scorm_id, attempt, attempt != last_online)
            .await?;
        Ok(match self.store.snapshot(scorm_id, attempt)? {
            Some(snapshot) if !snapshot.is_empty() => snapshot_equals(&snapshot, &remote),
            _ => false,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn add_to_new_or_delete(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
        last_offline: AttemptNumber,
        last_offline_created: i64,
        last_offline_incomplete: bool,
        plan: &mut RenumberPlan,
        warnings: &mut Vec<SyncWarning>,
    ) -> SyncResult<()> {
        if attempt == last_offline {
            plan.same_order.push(attempt);
            return Ok(());
        }

        match self.store.creation_time(scorm_id, attempt)? {
            Some(created) if created > last_offline_created => {
                if last_offline_incomplete {
                    debug!(
                        scorm_id,
                        attempt, "attempt cannot become a new attempt, deleting it"
                    );
                    if let Err(err) = self.store.delete_attempt(scorm_id, attempt) {
                        warn!(scorm_id, attempt, error = %err, "could not delete diverged attempt");
                    }
                    self.stats.write().attempts_discarded += 1;
                    warnings.push(SyncWarning::OfflineDataDeleted { attempt });
                } else {
                    plan.at_end.push((created, attempt));
                }
            }
            _ => plan.same_order.push(attempt),
        }
        Ok(())
    }

    /// Slots `new_attempts` right after the last online attempt.
    ///
    /// Offline attempts after the last collision move up first, highest
    /// number first, so no rename ever lands on a number still in use.
    fn move_new_attempts(
        &self,
        scorm_id: ScormId,
        new_attempts: &[AttemptNumber],
        last_online: AttemptNumber,
        last_collision: AttemptNumber,
        offline: &[AttemptNumber],
    ) -> SyncResult<()> {
        if new_attempts.is_empty() {
            return Ok(());
        }
        let shift = AttemptNumber::try_from(new_attempts.len()).unwrap_or(AttemptNumber::MAX);

        let mut later: Vec<AttemptNumber> = offline
            .iter()
            .copied()
            .filter(|&attempt| attempt > last_collision)
            .collect();
        later.sort_unstable_by(|a, b| b.cmp(a));

        let mut slotted = new_attempts.to_vec();
        slotted.sort_unstable();

        let renames = later
            .into_iter()
            .map(|attempt| (attempt, attempt + shift))
            .chain(slotted.into_iter().zip(last_online + 1..));
        self.apply_renames(scorm_id, renames)
    }

    /// Appends attempts past every number in use, oldest first.
    fn create_new_attempts_at_end(
        &self,
        scorm_id: ScormId,
        mut at_end: Vec<(i64, AttemptNumber)>,
        last_online: AttemptNumber,
    ) -> SyncResult<()> {
        if at_end.is_empty() {
            return Ok(());
        }
        at_end.sort_unstable();

        let in_use = self
            .store
            .attempts(scorm_id)?
            .iter()
            .map(|a| a.attempt)
            .max()
            .unwrap_or(0)
            .max(last_online);
        let renames = at_end
            .into_iter()
            .map(|(_, attempt)| attempt)
            .zip(in_use + 1..);
        self.apply_renames(scorm_id, renames)
    }

    /// Applies renames in order. On failure every completed rename is
    /// reverted, newest first.
    fn apply_renames(
        &self,
        scorm_id: ScormId,
        renames: impl IntoIterator<Item = (AttemptNumber, AttemptNumber)>,
    ) -> SyncResult<()> {
        let mut done: Vec<RenumberReceipt> = Vec::new();
        for (from, to) in renames {
            match self.store.change_attempt_number(scorm_id, from, to) {
                Ok(receipt) => done.push(receipt),
                Err(err) => {
                    error!(scorm_id, from, to, error = %err, "renumbering failed, reverting");
                    for receipt in done.iter().rev() {
                        if let Err(undo) = self.store.undo_attempt_number_change(receipt) {
                            warn!(
                                scorm_id,
                                from = receipt.to,
                                to = receipt.from,
                                error = %undo,
                                "could not revert renumbering"
                            );
                        }
                    }
                    return Err(err.into());
                }
            }
        }
        self.stats.write().attempts_renumbered += done.len() as u64;
        Ok(())
    }

    async fn sync_attempt_reporting(
        &self,
        activity: &ActivityConfig,
        attempt: AttemptNumber,
        warnings: &mut Vec<SyncWarning>,
    ) -> bool {
        match self.sync_attempt(activity.scorm_id, attempt).await {
            Ok(AttemptOutcome::Synced { sent }) => {
                self.stats.write().attempts_synced += 1;
                sent
            }
            Ok(AttemptOutcome::Discarded { sent, reason }) => {
                self.stats.write().attempts_discarded += 1;
                warnings.push(SyncWarning::DataDiscarded { attempt, reason });
                sent
            }
            Ok(AttemptOutcome::Kept { sent, error }) => {
                warnings.push(SyncWarning::AttemptFailed { attempt, error });
                sent
            }
            Err(err) => {
                warn!(scorm_id = activity.scorm_id, attempt, error = %err, "could not sync attempt");
                warnings.push(SyncWarning::AttemptFailed {
                    attempt,
                    error: err.to_string(),
                });
                false
            }
        }
    }

    /// Sends the unsynced dotted tracks of one attempt, SCO by SCO.
    async fn sync_attempt(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
    ) -> SyncResult<AttemptOutcome> {
        debug!(scorm_id, attempt, "syncing offline attempt");

        let mut scos: BTreeMap<ScoId, Vec<DataEntry>> = BTreeMap::new();
        for track in self
            .store
            .stored_data(scorm_id, attempt, SyncedFilter::OnlyUnsynced)?
        {
            if is_dotted(&track.element) {
                scos.entry(track.sco_id)
                    .or_default()
                    .push(DataEntry::new(track.element, track.value));
            }
        }

        let mut sent = false;
        for (sco_id, tracks) in scos {
            match self
                .remote
                .submit_tracks(scorm_id, sco_id, attempt, &tracks)
                .await
            {
                Ok(()) => {
                    if let Err(err) = self.store.mark_synced(scorm_id, attempt, sco_id) {
                        warn!(scorm_id, attempt, sco_id, error = %err, "could not mark tracks synced");
                    }
                    self.stats.write().tracks_sent += tracks.len() as u64;
                    sent = true;
                }
                Err(RemoteError::Rejected(reason)) => {
                    warn!(
                        scorm_id,
                        attempt,
                        sco_id,
                        reason = %reason,
                        "remote rejected offline data, discarding attempt"
                    );
                    self.delete_attempt_with_retry(scorm_id, attempt);
                    return Ok(AttemptOutcome::Discarded { sent, reason });
                }
                Err(err) => {
                    if sent {
                        error!(scorm_id, attempt, error = %err, "some SCOs were not sent, saving snapshot");
                        if let Err(snapshot_err) = self.save_sync_snapshot(scorm_id, attempt).await {
                            warn!(scorm_id, attempt, error = %snapshot_err, "could not save sync snapshot");
                        }
                    } else {
                        error!(scorm_id, attempt, error = %err, "could not send attempt");
                    }
                    return Ok(AttemptOutcome::Kept {
                        sent,
                        error: err.to_string(),
                    });
                }
            }
        }

        self.delete_attempt_with_retry(scorm_id, attempt);
        info!(scorm_id, attempt, "offline attempt synced");
        Ok(AttemptOutcome::Synced { sent })
    }

    /// Stores the remote state of a partially sent attempt so a later pass
    /// can tell whether it may resume.
    async fn save_sync_snapshot(&self, scorm_id: ScormId, attempt: AttemptNumber) -> SyncResult<()> {
        let data = match self.remote.fetch_user_data(scorm_id, attempt, true).await {
            Ok(data) => data,
            Err(err) => {
                debug!(scorm_id, attempt, error = %err, "building snapshot from cached data");
                let mut data = self
                    .remote
                    .fetch_user_data(scorm_id, attempt, false)
                    .await
                    .unwrap_or_default();
                for track in self
                    .store
                    .stored_data(scorm_id, attempt, SyncedFilter::OnlySynced)?
                {
                    data.entry(track.sco_id)
                        .or_insert_with(|| ScoUserData::new(track.sco_id))
                        .userdata
                        .insert(track.element, track.value);
                }
                data
            }
        };
        self.store.set_snapshot(scorm_id, attempt, Some(&data))?;
        Ok(())
    }

    fn delete_attempt_with_retry(&self, scorm_id: ScormId, attempt: AttemptNumber) {
        if let Err(first) = self.store.delete_attempt(scorm_id, attempt) {
            warn!(scorm_id, attempt, error = %first, "could not delete attempt, retrying");
            if let Err(second) = self.store.delete_attempt(scorm_id, attempt) {
                warn!(scorm_id, attempt, error = %second, "could not delete attempt");
            }
        }
    }

    async fn is_online_attempt_incomplete(
        &self,
        activity: &ActivityConfig,
        attempt: AttemptNumber,
    ) -> SyncResult<bool> {
        let data = self
            .remote
            .fetch_user_data(activity.scorm_id, attempt, true)
            .await?;
        Ok(is_attempt_incomplete(&data, &activity.scos))
    }

    fn is_offline_attempt_incomplete(
        &self,
        activity: &ActivityConfig,
        attempt: AttemptNumber,
    ) -> SyncResult<bool> {
        let learner = LearnerIdentity {
            user_id: self.store.user_id(),
            ..LearnerIdentity::default()
        };
        let data = self
            .store
            .user_data(activity.scorm_id, attempt, &activity.scos, &learner)?;
        Ok(is_attempt_incomplete(&data, &activity.scos))
    }
}

impl<R: RemoteService> std::fmt::Debug for SyncEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("ongoing", &self.ongoing.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use cmisync_model::ScoInfo;
    use cmisync_offline::{ManualClock, TrackTarget, CREATE_NEW_ATTEMPT};
    use cmisync_storage::{BackendOp, InMemoryBackend};

    const SCORM: ScormId = 10;

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        clock: Arc<ManualClock>,
        store: Arc<OfflineStore>,
        remote: Arc<MockRemote>,
        engine: Arc<SyncEngine<MockRemote>>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryBackend::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Arc::new(OfflineStore::new(backend.clone(), 5).with_clock(clock.clone()));
        let remote = Arc::new(MockRemote::new());
        let engine = Arc::new(SyncEngine::new(
            SyncConfig::default(),
            store.clone(),
            remote.clone(),
        ));
        Fixture {
            backend,
            clock,
            store,
            remote,
            engine,
        }
    }

    fn activity() -> ActivityConfig {
        ActivityConfig::new(SCORM, 1).with_scos(vec![ScoInfo::new(1, "sco.html")])
    }

    fn write(store: &OfflineStore, attempt: AttemptNumber, element: &str, value: &str) {
        let target = TrackTarget {
            scorm_id: SCORM,
            sco_id: 1,
            attempt,
        };
        store
            .insert_track(target, element, Some(value), false, &Default::default())
            .unwrap();
    }

    fn offline_attempt(f: &Fixture, attempt: AttemptNumber, status: &str) {
        f.store
            .create_attempt(&activity(), attempt, &Default::default(), None)
            .unwrap();
        write(&f.store, attempt, "cmi.core.lesson_status", status);
        f.clock.advance(10);
    }

    fn numbers(store: &OfflineStore) -> Vec<AttemptNumber> {
        store
            .attempts(SCORM)
            .unwrap()
            .into_iter()
            .map(|a| a.attempt)
            .collect()
    }

    #[tokio::test]
    async fn nothing_offline_finishes_immediately() {
        let f = fixture();
        let report = f.engine.sync_activity(&activity()).await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(f.engine.state(SCORM), SyncState::Synced);
        assert_eq!(f.engine.last_sync_time(SCORM), Some(1_000));
    }

    #[tokio::test]
    async fn offline_attempts_without_collisions_are_sent() {
        let f = fixture();
        offline_attempt(&f, 1, "completed");
        write(&f.store, 1, "cmi.core.score.raw", "80");
        write(&f.store, 1, "status", "bookkeeping");

        let report = f.engine.sync_activity(&activity()).await.unwrap();
        assert!(report.updated);
        assert!(report.attempt_finished);
        assert!(report.warnings.is_empty());
        assert!(numbers(&f.store).is_empty());

        let submissions = f.remote.submissions();
        assert_eq!(submissions.len(), 1);
        assert!(submissions[0].tracks.iter().all(|t| t.element.contains('.')));
        assert_eq!(f.engine.stats().attempts_synced, 1);
    }

    #[tokio::test]
    async fn incomplete_online_attempt_holds_new_attempts() {
        let f = fixture();
        f.remote.set_value(SCORM, 1, 1, "cmi.core.lesson_status", "incomplete");
        offline_attempt(&f, 2, "completed");

        let report = f.engine.sync_activity(&activity()).await.unwrap();
        assert_eq!(
            report.warnings,
            vec![SyncWarning::OnlineAttemptIncomplete { attempt: 1 }]
        );
        assert!(!report.updated);
        assert_eq!(numbers(&f.store), vec![2]);
    }

    #[tokio::test]
    async fn attempts_over_the_cap_are_kept() {
        let f = fixture();
        offline_attempt(&f, 1, "completed");
        offline_attempt(&f, 2, "completed");

        let capped = activity().with_max_attempts(1);
        f.engine.sync_activity(&capped).await.unwrap();
        assert_eq!(numbers(&f.store), vec![2]);
    }

    #[tokio::test]
    async fn rejected_data_is_discarded_with_warning() {
        let f = fixture();
        offline_attempt(&f, 1, "completed");
        f.remote.reject_sco(SCORM, 1);

        let report = f.engine.sync_activity(&activity()).await.unwrap();
        assert!(matches!(
            report.warnings.as_slice(),
            [SyncWarning::DataDiscarded { attempt: 1, .. }]
        ));
        assert!(numbers(&f.store).is_empty());
    }

    #[tokio::test]
    async fn unreachable_sco_keeps_attempt_and_snapshot() {
        let f = fixture();
        offline_attempt(&f, 1, "completed");
        let target = TrackTarget {
            scorm_id: SCORM,
            sco_id: 2,
            attempt: 1,
        };
        f.store
            .insert_track(target, "cmi.core.lesson_status", Some("completed"), false, &Default::default())
            .unwrap();
        f.remote.fail_sco(SCORM, 2);

        let report = f.engine.sync_activity(&activity()).await.unwrap();
        assert!(matches!(
            report.warnings.as_slice(),
            [SyncWarning::AttemptFailed { attempt: 1, .. }]
        ));
        assert!(report.updated);
        assert_eq!(numbers(&f.store), vec![1]);

        let snapshot = f.store.snapshot(SCORM, 1).unwrap().unwrap();
        assert_eq!(snapshot[&1].userdata["cmi.core.lesson_status"], "completed");
        let synced = f.store.stored_data(SCORM, 1, SyncedFilter::OnlySynced).unwrap();
        assert!(synced.iter().all(|t| t.sco_id == 1));

        // The remote did not change, so the next pass resumes in place.
        f.remote.clear_failures();
        let report = f.engine.sync_activity(&activity()).await.unwrap();
        assert!(report.warnings.is_empty());
        assert!(numbers(&f.store).is_empty());
        assert!(f.remote.attempt_data(SCORM, 2).is_none());
    }

    #[tokio::test]
    async fn collision_without_snapshot_becomes_new_attempt() {
        let f = fixture();
        f.remote.set_value(SCORM, 1, 1, "cmi.core.lesson_status", "passed");
        f.remote.set_value(SCORM, 1, 1, "cmi.core.score.raw", "90");
        offline_attempt(&f, 1, "failed");
        write(&f.store, 1, "cmi.core.score.raw", "10");

        let report = f.engine.sync_activity(&activity()).await.unwrap();
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert!(report.updated);
        assert!(report.attempt_finished);
        assert!(numbers(&f.store).is_empty());

        let online = f.remote.attempt_data(SCORM, 1).unwrap();
        assert_eq!(online[&1].userdata["cmi.core.lesson_status"], "passed");
        assert_eq!(online[&1].userdata["cmi.core.score.raw"], "90");
        let added = f.remote.attempt_data(SCORM, 2).unwrap();
        assert_eq!(added[&1].userdata["cmi.core.lesson_status"], "failed");
        assert_eq!(added[&1].userdata["cmi.core.score.raw"], "10");
        assert!(f.remote.submissions().iter().all(|s| s.attempt == 2));
        assert_eq!(f.engine.stats().attempts_renumbered, 1);
    }

    #[tokio::test]
    async fn collision_without_snapshot_waits_for_open_online_attempt() {
        let f = fixture();
        f.remote.set_value(SCORM, 1, 1, "cmi.core.lesson_status", "incomplete");
        f.remote.set_value(SCORM, 1, 1, "cmi.core.lesson_location", "page2");
        offline_attempt(&f, 1, "completed");

        let report = f.engine.sync_activity(&activity()).await.unwrap();
        assert_eq!(
            report.warnings,
            vec![SyncWarning::CannotSyncSome { last_online: 1 }]
        );
        assert!(!report.updated);
        assert_eq!(numbers(&f.store), vec![2]);
        assert!(f.remote.submissions().is_empty());
        let online = f.remote.attempt_data(SCORM, 1).unwrap();
        assert_eq!(online[&1].userdata["cmi.core.lesson_status"], "incomplete");
    }

    #[tokio::test]
    async fn partially_sent_attempt_moves_on_when_remote_changed() {
        let f = fixture();
        offline_attempt(&f, 1, "completed");
        let target = TrackTarget {
            scorm_id: SCORM,
            sco_id: 2,
            attempt: 1,
        };
        f.store
            .insert_track(target, "cmi.core.lesson_status", Some("passed"), false, &Default::default())
            .unwrap();
        f.remote.fail_sco(SCORM, 2);
        f.engine.sync_activity(&activity()).await.unwrap();
        assert_eq!(numbers(&f.store), vec![1]);

        // Another device kept working on attempt 1.
        f.remote.set_value(SCORM, 1, 1, "cmi.core.score.raw", "99");
        f.remote.clear_failures();

        let report = f.engine.sync_activity(&activity()).await.unwrap();
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert!(numbers(&f.store).is_empty());

        let online = f.remote.attempt_data(SCORM, 1).unwrap();
        assert_eq!(online[&1].userdata["cmi.core.score.raw"], "99");
        assert!(!online.contains_key(&2));
        let moved = f.remote.attempt_data(SCORM, 2).unwrap();
        assert_eq!(moved[&2].userdata["cmi.core.lesson_status"], "passed");
        assert_eq!(f.engine.stats().attempts_renumbered, 1);
    }

    #[tokio::test]
    async fn leftover_of_successful_sync_is_deleted() {
        let f = fixture();
        offline_attempt(&f, 1, "completed");
        f.store.mark_synced(SCORM, 1, 1).unwrap();
        f.remote.set_value(SCORM, 1, 1, "cmi.core.lesson_status", "completed");

        let report = f.engine.sync_activity(&activity()).await.unwrap();
        assert!(report.warnings.is_empty());
        assert!(numbers(&f.store).is_empty());
        assert!(f.remote.submissions().is_empty());
    }

    #[tokio::test]
    async fn blocked_activity_fails_fast() {
        let f = fixture();
        offline_attempt(&f, 1, "completed");
        let _guard = f.store.locks().acquire(COMPONENT, SCORM, CREATE_NEW_ATTEMPT);

        let err = f.engine.sync_activity(&activity()).await.unwrap_err();
        assert!(matches!(err, SyncError::Blocked { scorm_id: SCORM }));
        assert_eq!(f.engine.state(SCORM), SyncState::Error);
        assert_eq!(numbers(&f.store), vec![1]);
    }

    #[tokio::test]
    async fn failed_renumbering_is_reverted() {
        let f = fixture();
        f.remote.set_value(SCORM, 1, 1, "cmi.core.lesson_status", "completed");
        f.remote.set_value(SCORM, 2, 1, "cmi.core.lesson_status", "completed");

        for attempt in [1, 2] {
            let snapshot = f.remote.attempt_data(SCORM, attempt).unwrap();
            f.store
                .create_attempt(&activity(), attempt, &Default::default(), Some(&snapshot))
                .unwrap();
            write(&f.store, attempt, "cmi.core.lesson_location", "offline");
            f.clock.advance(10);
        }
        offline_attempt(&f, 3, "completed");
        f.remote.set_value(SCORM, 1, 1, "cmi.core.score.raw", "10");
        f.remote.set_value(SCORM, 2, 1, "cmi.core.score.raw", "20");

        // The shift of attempt 3 succeeds, moving attempt 1 fails.
        f.backend.fail_after(BackendOp::UpdateAttempts, 1);
        let err = f.engine.sync_activity(&activity()).await.unwrap_err();
        assert!(matches!(err, SyncError::Offline(_)));
        assert_eq!(numbers(&f.store), vec![1, 2, 3]);
        assert!(f.remote.submissions().is_empty());
        let tracks = f.store.stored_data(SCORM, 3, SyncedFilter::All).unwrap();
        assert_eq!(tracks.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_pass() {
        let f = fixture();
        offline_attempt(&f, 1, "completed");

        let first = f.engine.sync_activity(&activity());
        let second = f.engine.sync_activity(&activity());
        let (a, b) = futures::join!(first, second);
        assert_eq!(a.unwrap(), b.unwrap());
        // One request at the start of the pass, one when it finishes.
        assert_eq!(f.remote.inventory_requests(), 2);
    }

    #[tokio::test]
    async fn sync_if_needed_respects_interval() {
        let f = fixture();
        offline_attempt(&f, 1, "completed");
        assert!(f.engine.sync_if_needed(&activity()).await.unwrap().is_some());

        offline_attempt(&f, 2, "completed");
        assert!(f.engine.sync_if_needed(&activity()).await.unwrap().is_none());

        f.clock.advance(300);
        assert!(f.engine.sync_if_needed(&activity()).await.unwrap().is_some());
        assert!(numbers(&f.store).is_empty());
    }
}
