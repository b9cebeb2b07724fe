//! Core types shared by the runtime, the offline store and the sync engine.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ScoInfo;

/// Activity (SCORM package) identifier.
pub type ScormId = u64;
/// SCO identifier.
pub type ScoId = u64;
/// Learner identifier.
pub type UserId = u64;
/// Course identifier.
pub type CourseId = u64;
/// Attempt number, starting at 1.
pub type AttemptNumber = u32;

/// Element name to string value.
pub type ElementMap = BTreeMap<String, String>;

/// Tracked data of every SCO in an attempt.
pub type UserDataMap = BTreeMap<ScoId, ScoUserData>;

/// One element write, as persisted or transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntry {
    /// Element name.
    pub element: String,
    /// Value as a string.
    pub value: String,
}

impl DataEntry {
    /// Creates an entry.
    pub fn new(element: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            value: value.into(),
        }
    }
}

/// Tracked data of a single SCO.
///
/// `userdata` holds learner values plus a few bookkeeping keys without dots
/// (`status`, `score_raw`, ...). `defaultdata` holds the values the LMS
/// supplies when the SCO is launched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoUserData {
    /// SCO id.
    pub sco_id: ScoId,
    /// Learner values and bookkeeping keys.
    #[serde(default)]
    pub userdata: ElementMap,
    /// Launch defaults.
    #[serde(default)]
    pub defaultdata: ElementMap,
}

impl ScoUserData {
    /// Creates an empty entry for a SCO.
    pub fn new(sco_id: ScoId) -> Self {
        Self {
            sco_id,
            ..Self::default()
        }
    }

    /// Adds a userdata value.
    #[must_use]
    pub fn with_value(mut self, element: impl Into<String>, value: impl Into<String>) -> Self {
        self.userdata.insert(element.into(), value.into());
        self
    }

    /// Adds a default value.
    #[must_use]
    pub fn with_default(mut self, element: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaultdata.insert(element.into(), value.into());
        self
    }

    /// Returns the learner status, preferring the formatted `status` key.
    pub fn status(&self) -> String {
        if let Some(status) = self.userdata.get("status") {
            return status.clone();
        }
        self.userdata
            .get("cmi.core.lesson_status")
            .map(|s| normalize_status(s))
            .unwrap_or_default()
    }

    /// Iterates over dotted (transmittable) userdata elements.
    pub fn dotted(&self) -> impl Iterator<Item = (&String, &String)> {
        self.userdata.iter().filter(|(k, _)| is_dotted(k))
    }
}

/// Session mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Tracked attempt.
    #[default]
    Normal,
    /// Preview without credit.
    Browse,
    /// Read-only review of a finished attempt.
    Review,
}

impl Mode {
    /// Returns the CMI string for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Browse => "browse",
            Mode::Review => "review",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Mode::Normal),
            "browse" => Ok(Mode::Browse),
            "review" => Ok(Mode::Review),
            other => Err(format!("unknown mode {other:?}")),
        }
    }
}

/// Identity of the learner, copied into launch defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerIdentity {
    /// Learner id.
    pub user_id: UserId,
    /// Value of `cmi.core.student_id`.
    pub student_id: String,
    /// Value of `cmi.core.student_name`.
    pub student_name: String,
}

/// Returns true for element names that are transmitted (contain a dot).
pub fn is_dotted(element: &str) -> bool {
    element.contains('.')
}

/// Converts `not attempted` to the compact `notattempted` form.
pub fn normalize_status(status: &str) -> String {
    if status == "not attempted" {
        "notattempted".to_string()
    } else {
        status.to_string()
    }
}

/// Returns true if a (normalized) status means the SCO is not done.
pub fn is_status_incomplete(status: &str) -> bool {
    matches!(status, "" | "notattempted" | "not attempted" | "incomplete" | "browsed")
}

/// Returns true if any visible, launchable SCO of the attempt is not done.
pub fn is_attempt_incomplete(data: &UserDataMap, scos: &[ScoInfo]) -> bool {
    scos.iter()
        .filter(|sco| sco.visible && !sco.launch.is_empty())
        .any(|sco| {
            let status = data.get(&sco.id).map(ScoUserData::status).unwrap_or_default();
            is_status_incomplete(&status)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_prefers_formatted_key() {
        let data = ScoUserData::new(1)
            .with_value("status", "completed")
            .with_value("cmi.core.lesson_status", "incomplete");
        assert_eq!(data.status(), "completed");

        let data = ScoUserData::new(1).with_value("cmi.core.lesson_status", "not attempted");
        assert_eq!(data.status(), "notattempted");
    }

    #[test]
    fn incomplete_statuses() {
        for status in ["", "notattempted", "incomplete", "browsed"] {
            assert!(is_status_incomplete(status), "{status}");
        }
        for status in ["completed", "passed", "failed"] {
            assert!(!is_status_incomplete(status), "{status}");
        }
    }

    #[test]
    fn attempt_incomplete_ignores_hidden_scos() {
        let scos = vec![
            ScoInfo::new(1, "index.html"),
            ScoInfo::new(2, "hidden.html").hidden(),
        ];
        let mut data = UserDataMap::new();
        data.insert(1, ScoUserData::new(1).with_value("status", "passed"));
        data.insert(2, ScoUserData::new(2).with_value("status", "incomplete"));
        assert!(!is_attempt_incomplete(&data, &scos));

        data.insert(1, ScoUserData::new(1).with_value("status", "incomplete"));
        assert!(is_attempt_incomplete(&data, &scos));
    }

    #[test]
    fn mode_parses() {
        assert_eq!("browse".parse::<Mode>(), Ok(Mode::Browse));
        assert!("other".parse::<Mode>().is_err());
    }
}
