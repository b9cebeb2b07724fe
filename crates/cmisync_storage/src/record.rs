//! Row types and exact-match filters for the two offline tables.

use serde::{Deserialize, Serialize};

/// Primary key of an attempt row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttemptKey {
    /// Activity (SCORM package) id.
    pub scorm_id: u64,
    /// Learner id.
    pub user_id: u64,
    /// Attempt number, starting at 1.
    pub attempt: u32,
}

impl std::fmt::Display for AttemptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.scorm_id, self.user_id, self.attempt)
    }
}

/// An attempt registered in the offline store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRow {
    /// Activity id.
    pub scorm_id: u64,
    /// Learner id.
    pub user_id: u64,
    /// Attempt number.
    pub attempt: u32,
    /// Course the activity belongs to.
    pub course_id: u64,
    /// Creation time, seconds since the Unix epoch.
    pub time_created: i64,
    /// Last modification time, seconds since the Unix epoch.
    pub time_modified: i64,
    /// JSON-encoded snapshot of the remote state, if one was taken.
    pub snapshot: Option<String>,
}

impl AttemptRow {
    /// Returns the primary key of this row.
    pub fn key(&self) -> AttemptKey {
        AttemptKey {
            scorm_id: self.scorm_id,
            user_id: self.user_id,
            attempt: self.attempt,
        }
    }
}

/// Primary key of a track row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackKey {
    /// Activity id.
    pub scorm_id: u64,
    /// Learner id.
    pub user_id: u64,
    /// Attempt number.
    pub attempt: u32,
    /// SCO the element belongs to.
    pub sco_id: u64,
    /// Element name.
    pub element: String,
}

impl std::fmt::Display for TrackKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.scorm_id, self.user_id, self.attempt, self.sco_id, self.element
        )
    }
}

/// One tracked element value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRow {
    /// Activity id.
    pub scorm_id: u64,
    /// Learner id.
    pub user_id: u64,
    /// Attempt number.
    pub attempt: u32,
    /// SCO id.
    pub sco_id: u64,
    /// Element name.
    pub element: String,
    /// JSON-encoded value.
    pub value: Option<String>,
    /// Last modification time, seconds since the Unix epoch.
    pub time_modified: i64,
    /// Whether the value was accepted by the remote service.
    pub synced: bool,
}

impl TrackRow {
    /// Returns the primary key of this row.
    pub fn key(&self) -> TrackKey {
        TrackKey {
            scorm_id: self.scorm_id,
            user_id: self.user_id,
            attempt: self.attempt,
            sco_id: self.sco_id,
            element: self.element.clone(),
        }
    }
}

/// Exact-match conditions over attempt rows. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptFilter {
    /// Activity id.
    pub scorm_id: Option<u64>,
    /// Learner id.
    pub user_id: Option<u64>,
    /// Attempt number.
    pub attempt: Option<u32>,
}

impl AttemptFilter {
    /// Matches every attempt row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches the rows of one learner.
    #[must_use]
    pub fn user(user_id: u64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Restricts the filter to one activity.
    #[must_use]
    pub fn with_scorm(mut self, scorm_id: u64) -> Self {
        self.scorm_id = Some(scorm_id);
        self
    }

    /// Restricts the filter to one attempt number.
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Returns true if `row` satisfies every set condition.
    pub fn matches(&self, row: &AttemptRow) -> bool {
        self.scorm_id.map_or(true, |v| v == row.scorm_id)
            && self.user_id.map_or(true, |v| v == row.user_id)
            && self.attempt.map_or(true, |v| v == row.attempt)
    }
}

impl From<AttemptKey> for AttemptFilter {
    fn from(key: AttemptKey) -> Self {
        Self {
            scorm_id: Some(key.scorm_id),
            user_id: Some(key.user_id),
            attempt: Some(key.attempt),
        }
    }
}

/// Exact-match conditions over track rows. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFilter {
    /// Activity id.
    pub scorm_id: Option<u64>,
    /// Learner id.
    pub user_id: Option<u64>,
    /// Attempt number.
    pub attempt: Option<u32>,
    /// SCO id.
    pub sco_id: Option<u64>,
    /// Element name.
    pub element: Option<String>,
    /// Synced flag.
    pub synced: Option<bool>,
}

impl TrackFilter {
    /// Matches every track of one attempt.
    #[must_use]
    pub fn attempt(key: AttemptKey) -> Self {
        Self {
            scorm_id: Some(key.scorm_id),
            user_id: Some(key.user_id),
            attempt: Some(key.attempt),
            ..Self::default()
        }
    }

    /// Restricts the filter to one SCO.
    #[must_use]
    pub fn with_sco(mut self, sco_id: u64) -> Self {
        self.sco_id = Some(sco_id);
        self
    }

    /// Restricts the filter to one element.
    #[must_use]
    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    /// Restricts the filter by synced flag.
    #[must_use]
    pub fn with_synced(mut self, synced: bool) -> Self {
        self.synced = Some(synced);
        self
    }

    /// Returns true if `row` satisfies every set condition.
    pub fn matches(&self, row: &TrackRow) -> bool {
        self.scorm_id.map_or(true, |v| v == row.scorm_id)
            && self.user_id.map_or(true, |v| v == row.user_id)
            && self.attempt.map_or(true, |v| v == row.attempt)
            && self.sco_id.map_or(true, |v| v == row.sco_id)
            && self.element.as_deref().map_or(true, |v| v == row.element)
            && self.synced.map_or(true, |v| v == row.synced)
    }
}

/// Column changes applied to matching attempt rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptUpdate {
    /// New attempt number.
    pub attempt: Option<u32>,
    /// New modification time.
    pub time_modified: Option<i64>,
    /// New snapshot; `Some(None)` clears it.
    pub snapshot: Option<Option<String>>,
}

impl AttemptUpdate {
    /// Returns true if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.attempt.is_none() && self.time_modified.is_none() && self.snapshot.is_none()
    }

    pub(crate) fn apply(&self, row: &mut AttemptRow) {
        if let Some(attempt) = self.attempt {
            row.attempt = attempt;
        }
        if let Some(time) = self.time_modified {
            row.time_modified = time;
        }
        if let Some(snapshot) = &self.snapshot {
            row.snapshot = snapshot.clone();
        }
    }
}

/// Column changes applied to matching track rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackUpdate {
    /// New attempt number.
    pub attempt: Option<u32>,
    /// New synced flag.
    pub synced: Option<bool>,
}

impl TrackUpdate {
    /// Returns true if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.attempt.is_none() && self.synced.is_none()
    }

    pub(crate) fn apply(&self, row: &mut TrackRow) {
        if let Some(attempt) = self.attempt {
            row.attempt = attempt;
        }
        if let Some(synced) = self.synced {
            row.synced = synced;
        }
    }
}
