//! Tracks command implementation.

use cmisync_model::{AttemptNumber, ScormId};
use cmisync_offline::{OfflineStore, StoredTrack, SyncedFilter};

use super::{ensure_attempt, print_json, OutputFormat};

/// Collects the tracks of an attempt.
pub fn collect(
    store: &OfflineStore,
    scorm_id: ScormId,
    attempt: AttemptNumber,
    unsynced: bool,
) -> Result<Vec<StoredTrack>, Box<dyn std::error::Error>> {
    ensure_attempt(store, scorm_id, attempt)?;
    let filter = if unsynced {
        SyncedFilter::OnlyUnsynced
    } else {
        SyncedFilter::All
    };
    Ok(store.stored_data(scorm_id, attempt, filter)?)
}

/// Runs the tracks command.
pub fn run(
    store: &OfflineStore,
    scorm_id: ScormId,
    attempt: AttemptNumber,
    unsynced: bool,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let tracks = collect(store, scorm_id, attempt, unsynced)?;
    match format {
        OutputFormat::Json => print_json(&tracks)?,
        OutputFormat::Text => {
            for track in &tracks {
                println!(
                    "{:>6} {} {} = {:?}",
                    track.sco_id,
                    if track.synced { "S" } else { " " },
                    track.element,
                    track.value
                );
            }
            println!("{} track(s)", tracks.len());
        }
    }
    Ok(())
}
