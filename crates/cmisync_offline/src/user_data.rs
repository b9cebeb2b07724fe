//! Rebuilding runtime user data from stored tracks.

use std::collections::BTreeMap;

use cmisync_model::{
    normalize_status, AttemptNumber, ElementMap, LearnerIdentity, ScoInfo, ScoUserData, ScormId,
    UserDataMap,
};

use crate::error::OfflineResult;
use crate::store::{OfflineStore, StoredTrack, SyncedFilter};

const ZERO_TIME: &str = "00:00:00";

impl OfflineStore {
    /// Returns the user data of an offline attempt, ready to start a
    /// runtime session from.
    ///
    /// SCOs listed in `scos` without stored tracks get empty entries.
    pub fn user_data(
        &self,
        scorm_id: ScormId,
        attempt: AttemptNumber,
        scos: &[ScoInfo],
        learner: &LearnerIdentity,
    ) -> OfflineResult<UserDataMap> {
        let tracks = self.stored_data(scorm_id, attempt, SyncedFilter::All)?;
        Ok(build_user_data(&tracks, scos, learner))
    }
}

/// Groups tracks by SCO and adds the bookkeeping and launch values.
pub fn build_user_data(
    tracks: &[StoredTrack],
    scos: &[ScoInfo],
    learner: &LearnerIdentity,
) -> UserDataMap {
    let mut grouped: BTreeMap<u64, (ElementMap, i64)> = BTreeMap::new();
    for track in tracks {
        let (values, modified) = grouped.entry(track.sco_id).or_default();
        values.insert(track.element.clone(), track.value.clone());
        *modified = (*modified).max(track.time_modified);
    }

    let mut data = UserDataMap::new();
    for (sco_id, (values, modified)) in grouped {
        let mut userdata = format_values(values);
        userdata.insert("userid".into(), learner.user_id.to_string());
        userdata.insert("scoid".into(), sco_id.to_string());
        userdata.insert("timemodified".into(), modified.to_string());
        data.insert(
            sco_id,
            ScoUserData {
                sco_id,
                userdata,
                defaultdata: ElementMap::new(),
            },
        );
    }

    for sco in scos {
        data.entry(sco.id).or_insert_with(|| {
            ScoUserData::new(sco.id)
                .with_value("status", "")
                .with_value("score_raw", "")
        });
    }

    for sco in data.values_mut() {
        let launch = scos
            .iter()
            .find(|info| info.id == sco.sco_id)
            .map(|info| info.launch.clone())
            .unwrap_or_default();
        sco.defaultdata = launch_defaults(&sco.userdata, learner, launch);

        for (key, element) in [
            ("mode", "cmi.core.lesson_mode"),
            ("credit", "cmi.core.credit"),
            ("entry", "cmi.core.entry"),
        ] {
            let value = sco.defaultdata.get(element).cloned().unwrap_or_default();
            sco.userdata.insert(key.into(), value);
        }
        sco.userdata.insert("student_id".into(), learner.student_id.clone());
        sco.userdata.insert("student_name".into(), learner.student_name.clone());
    }
    data
}

/// Adds the formatted `status`, `score_raw`, `total_time` and `session_time`
/// fields.
fn format_values(values: ElementMap) -> ElementMap {
    let mut formatted = ElementMap::from([
        ("score_raw".to_string(), String::new()),
        ("status".to_string(), String::new()),
        ("total_time".to_string(), ZERO_TIME.to_string()),
        ("session_time".to_string(), ZERO_TIME.to_string()),
    ]);

    for (element, value) in values {
        if matches!(element.as_str(), "score_raw" | "status" | "total_time" | "session_time") {
            continue;
        }
        match element.as_str() {
            "cmi.core.lesson_status" => {
                formatted.insert("status".into(), normalize_status(&value));
            }
            "cmi.core.score.raw" => {
                formatted.insert("score_raw".into(), round_score(&value));
            }
            "cmi.core.session_time" => {
                formatted.insert("session_time".into(), value.clone());
            }
            "cmi.core.total_time" => {
                formatted.insert("total_time".into(), value.clone());
            }
            _ => {}
        }
        formatted.insert(element, value);
    }
    formatted
}

fn round_score(raw: &str) -> String {
    raw.trim()
        .parse::<f64>()
        .map(|score| ((score * 100.0).round() / 100.0).to_string())
        .unwrap_or_default()
}

fn launch_defaults(userdata: &ElementMap, learner: &LearnerIdentity, launch: String) -> ElementMap {
    let get = |key: &str, default: &str| {
        userdata
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    };

    let entry = if userdata.get("status").map_or(true, String::is_empty) {
        "ab-initio"
    } else if userdata.get("cmi.core.exit").map(String::as_str) == Some("suspend") {
        "resume"
    } else {
        ""
    };

    ElementMap::from([
        ("cmi.core.student_id".into(), learner.student_id.clone()),
        ("cmi.core.student_name".into(), learner.student_name.clone()),
        ("cmi.core.lesson_mode".into(), "normal".into()),
        ("cmi.core.credit".into(), "credit".into()),
        ("cmi.core.entry".into(), entry.into()),
        ("cmi.student_data.mastery_score".into(), get("masteryscore", "")),
        ("cmi.student_data.max_time_allowed".into(), get("max_time_allowed", "")),
        ("cmi.student_data.time_limit_action".into(), get("time_limit_action", "")),
        ("cmi.core.total_time".into(), get("cmi.core.total_time", ZERO_TIME)),
        ("cmi.launch_data".into(), launch),
        ("cmi.core.lesson_location".into(), get("cmi.core.lesson_location", "")),
        ("cmi.core.lesson_status".into(), get("cmi.core.lesson_status", "")),
        ("cmi.core.score.raw".into(), get("cmi.core.score.raw", "")),
        ("cmi.core.score.max".into(), get("cmi.core.score.max", "")),
        ("cmi.core.score.min".into(), get("cmi.core.score.min", "")),
        ("cmi.core.exit".into(), get("cmi.core.exit", "")),
        ("cmi.suspend_data".into(), get("cmi.suspend_data", "")),
        ("cmi.comments".into(), get("cmi.comments", "")),
        ("cmi.student_preference.language".into(), get("cmi.student_preference.language", "")),
        ("cmi.student_preference.audio".into(), get("cmi.student_preference.audio", "0")),
        ("cmi.student_preference.speed".into(), get("cmi.student_preference.speed", "0")),
        ("cmi.student_preference.text".into(), get("cmi.student_preference.text", "0")),
    ])
}
