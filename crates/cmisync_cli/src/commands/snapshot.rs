//! Snapshot command implementation.

use cmisync_model::{AttemptNumber, ScormId, UserDataMap};
use cmisync_offline::OfflineStore;

use super::{ensure_attempt, print_json, OutputFormat};

/// Loads the snapshot of an attempt.
pub fn collect(
    store: &OfflineStore,
    scorm_id: ScormId,
    attempt: AttemptNumber,
) -> Result<Option<UserDataMap>, Box<dyn std::error::Error>> {
    ensure_attempt(store, scorm_id, attempt)?;
    Ok(store.snapshot(scorm_id, attempt)?)
}

/// Runs the snapshot command.
pub fn run(
    store: &OfflineStore,
    scorm_id: ScormId,
    attempt: AttemptNumber,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = collect(store, scorm_id, attempt)?;
    match (format, snapshot) {
        (OutputFormat::Json, snapshot) => print_json(&snapshot)?,
        (OutputFormat::Text, None) => println!("Attempt {attempt} has no snapshot"),
        (OutputFormat::Text, Some(snapshot)) => {
            for (sco_id, sco) in &snapshot {
                println!("SCO {sco_id}");
                for (element, value) in &sco.userdata {
                    println!("  {element} = {value:?}");
                }
            }
        }
    }
    Ok(())
}
