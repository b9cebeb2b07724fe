//! Delete command implementation.

use cmisync_model::{AttemptNumber, ScormId};
use cmisync_offline::{OfflineStore, SyncedFilter};
use serde::Serialize;
use tracing::info;

use super::{ensure_attempt, print_json, OutputFormat};

/// What a deletion removed.
#[derive(Debug, Serialize)]
pub struct DeleteResult {
    /// Activity id.
    pub scorm_id: ScormId,
    /// Attempt number.
    pub attempt: AttemptNumber,
    /// Tracks removed with the attempt.
    pub tracks: usize,
    /// Tracks that had not been sent.
    pub unsynced: usize,
    /// Whether nothing was actually deleted.
    pub dry_run: bool,
}

/// Deletes an attempt unless `dry_run` is set.
pub fn execute(
    store: &OfflineStore,
    scorm_id: ScormId,
    attempt: AttemptNumber,
    dry_run: bool,
) -> Result<DeleteResult, Box<dyn std::error::Error>> {
    ensure_attempt(store, scorm_id, attempt)?;
    let tracks = store.stored_data(scorm_id, attempt, SyncedFilter::All)?;
    let unsynced = tracks.iter().filter(|t| !t.synced).count();

    if !dry_run {
        store.delete_attempt(scorm_id, attempt)?;
        info!(scorm_id, attempt, tracks = tracks.len(), "deleted offline attempt");
    }
    Ok(DeleteResult {
        scorm_id,
        attempt,
        tracks: tracks.len(),
        unsynced,
        dry_run,
    })
}

/// Runs the delete command.
pub fn run(
    store: &OfflineStore,
    scorm_id: ScormId,
    attempt: AttemptNumber,
    dry_run: bool,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = execute(store, scorm_id, attempt, dry_run)?;
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => {
            let verb = if dry_run { "Would delete" } else { "Deleted" };
            println!(
                "{verb} attempt {} of activity {} ({} tracks, {} unsynced)",
                result.attempt, result.scorm_id, result.tracks, result.unsynced
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::seeded_store;

    #[test]
    fn dry_run_keeps_attempt() {
        let (_dir, store) = seeded_store();
        let result = execute(&store, 4, 1, true).unwrap();
        assert_eq!(result.tracks, 2);
        assert_eq!(result.unsynced, 2);
        assert!(store.attempt(4, 1).unwrap().is_some());
    }

    #[test]
    fn deletes_attempt_and_tracks() {
        let (_dir, store) = seeded_store();
        execute(&store, 4, 2, false).unwrap();
        assert!(store.attempt(4, 2).unwrap().is_none());
        assert!(store.stored_data(4, 2, SyncedFilter::All).unwrap().is_empty());
        assert!(execute(&store, 4, 2, false).is_err());
    }
}
