//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use cmisync_model::{DataEntry, ScoId, ScoUserData, TrackBatch, UserDataMap};

/// Generates `count` interaction tracks, as a content package answering a quiz would.
pub fn interaction_tracks(count: usize) -> Vec<DataEntry> {
    (0..count)
        .flat_map(|n| {
            [
                DataEntry::new(format!("cmi.interactions_{n}.id"), format!("q{n}")),
                DataEntry::new(format!("cmi.interactions_{n}.type"), "choice"),
                DataEntry::new(format!("cmi.interactions_{n}.result"), "correct"),
            ]
        })
        .collect()
}

/// Generates a commit batch of `count` interactions.
pub fn track_batch(scorm_id: u64, attempt: u32, count: usize) -> TrackBatch {
    TrackBatch {
        scorm_id,
        course_id: 1,
        sco_id: 1,
        attempt,
        tracks: interaction_tracks(count),
        force_completed: false,
        sco_data: Default::default(),
    }
}

/// Generates user data for `scos` SCOs with `elements` values each.
pub fn user_data(scos: ScoId, elements: usize) -> UserDataMap {
    (1..=scos)
        .map(|sco_id| {
            let mut sco = ScoUserData::new(sco_id)
                .with_value("cmi.core.lesson_status", "completed")
                .with_value("status", "completed");
            for n in 0..elements {
                sco = sco.with_value(format!("cmi.objectives_{n}.id"), format!("obj{n}"));
            }
            (sco_id, sco)
        })
        .collect()
}
