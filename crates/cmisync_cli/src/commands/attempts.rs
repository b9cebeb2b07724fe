//! Attempts command implementation.

use cmisync_model::ScormId;
use cmisync_offline::{OfflineAttempt, OfflineStore, SyncedFilter};
use serde::Serialize;

use super::{print_json, OutputFormat};

/// One listed attempt.
#[derive(Debug, Serialize)]
pub struct AttemptSummary {
    /// Activity id.
    pub scorm_id: ScormId,
    /// Learner id.
    pub user_id: u64,
    /// Attempt number.
    pub attempt: u32,
    /// Course id.
    pub course_id: u64,
    /// Creation time.
    pub time_created: i64,
    /// Last modification time.
    pub time_modified: i64,
    /// Number of stored tracks, `None` for other learners.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<usize>,
    /// Number of tracks not yet sent, `None` for other learners.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsynced: Option<usize>,
    /// Whether a snapshot is stored.
    pub has_snapshot: bool,
}

/// Collects the attempts to list.
pub fn collect(
    store: &OfflineStore,
    scorm_id: Option<ScormId>,
    all_users: bool,
) -> Result<Vec<AttemptSummary>, Box<dyn std::error::Error>> {
    let attempts: Vec<OfflineAttempt> = match (scorm_id, all_users) {
        (Some(id), false) => store.attempts(id)?,
        _ => store
            .all_attempts()?
            .into_iter()
            .filter(|a| all_users || a.user_id == store.user_id())
            .filter(|a| scorm_id.map_or(true, |id| a.scorm_id == id))
            .collect(),
    };

    attempts
        .into_iter()
        .map(|a| {
            // Tracks are keyed by learner, so only the store's own are counted.
            let (tracks, unsynced) = if a.user_id == store.user_id() {
                let all = store.stored_data(a.scorm_id, a.attempt, SyncedFilter::All)?;
                let unsynced = all.iter().filter(|t| !t.synced).count();
                (Some(all.len()), Some(unsynced))
            } else {
                (None, None)
            };
            Ok(AttemptSummary {
                scorm_id: a.scorm_id,
                user_id: a.user_id,
                attempt: a.attempt,
                course_id: a.course_id,
                time_created: a.time_created,
                time_modified: a.time_modified,
                tracks,
                unsynced,
                has_snapshot: a.snapshot.is_some(),
            })
        })
        .collect()
}

/// Runs the attempts command.
pub fn run(
    store: &OfflineStore,
    scorm_id: Option<ScormId>,
    all_users: bool,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let attempts = collect(store, scorm_id, all_users)?;
    match format {
        OutputFormat::Json => print_json(&attempts)?,
        OutputFormat::Text => print_text_output(&attempts),
    }
    Ok(())
}

fn print_text_output(attempts: &[AttemptSummary]) {
    if attempts.is_empty() {
        println!("No offline attempts");
        return;
    }
    println!(
        "{:>8} {:>8} {:>8} {:>8} {:>8} {:>9}  {}",
        "SCORM", "USER", "ATTEMPT", "TRACKS", "UNSYNCED", "SNAPSHOT", "MODIFIED"
    );
    for a in attempts {
        let count = |n: Option<usize>| n.map_or_else(|| "-".to_string(), |n| n.to_string());
        println!(
            "{:>8} {:>8} {:>8} {:>8} {:>8} {:>9}  {}",
            a.scorm_id,
            a.user_id,
            a.attempt,
            count(a.tracks),
            count(a.unsynced),
            if a.has_snapshot { "yes" } else { "no" },
            a.time_modified
        );
    }
}
