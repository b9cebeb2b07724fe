//! Activity and session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{AttemptNumber, CourseId, Mode, ScoId, ScormId};

/// Idle delay before an automatic commit.
pub const DEFAULT_AUTOCOMMIT_DELAY: Duration = Duration::from_secs(60);

/// How attempts are combined into the activity grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GradingMethod {
    /// Best attempt.
    #[default]
    Highest,
    /// Mean of all attempts.
    Average,
    /// First completed attempt.
    First,
    /// Last completed attempt.
    Last,
}

/// When a new attempt starts automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForceNewAttempt {
    /// Only when the learner asks for it.
    #[default]
    No,
    /// When the previous attempt is complete.
    OnComplete,
    /// On every launch.
    Always,
}

/// A SCO of the activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoInfo {
    /// SCO id.
    pub id: ScoId,
    /// Launch URL, empty for organization nodes.
    pub launch: String,
    /// Whether the SCO is shown in the table of contents.
    pub visible: bool,
}

impl ScoInfo {
    /// Creates a visible SCO.
    pub fn new(id: ScoId, launch: impl Into<String>) -> Self {
        Self {
            id,
            launch: launch.into(),
            visible: true,
        }
    }

    /// Marks the SCO as hidden.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// Host configuration of a SCORM activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Activity id.
    pub scorm_id: ScormId,
    /// Course id.
    pub course_id: CourseId,
    /// Maximum number of attempts, 0 for unlimited.
    pub max_attempts: AttemptNumber,
    /// Grading method across attempts.
    pub grading: GradingMethod,
    /// Store `completed` when a score arrives for an incomplete SCO.
    pub force_completed: bool,
    /// New attempt policy.
    pub force_new_attempt: ForceNewAttempt,
    /// Commit automatically after writes.
    pub autocommit: bool,
    /// Delay before an automatic commit.
    pub autocommit_delay: Duration,
    /// Launch the next SCO after `Finish` when content gives no direction.
    pub auto_continue: bool,
    /// Hide the browse (preview) mode.
    pub hide_browse: bool,
    /// Enforce the standard length limits on string values.
    pub strict_strings: bool,
    /// SCOs in table-of-contents order.
    pub scos: Vec<ScoInfo>,
}

impl ActivityConfig {
    /// Creates a configuration with default policies.
    pub fn new(scorm_id: ScormId, course_id: CourseId) -> Self {
        Self {
            scorm_id,
            course_id,
            max_attempts: 0,
            grading: GradingMethod::default(),
            force_completed: false,
            force_new_attempt: ForceNewAttempt::default(),
            autocommit: false,
            autocommit_delay: DEFAULT_AUTOCOMMIT_DELAY,
            auto_continue: false,
            hide_browse: false,
            strict_strings: true,
            scos: Vec::new(),
        }
    }

    /// Sets the attempt cap.
    #[must_use]
    pub fn with_max_attempts(mut self, max: AttemptNumber) -> Self {
        self.max_attempts = max;
        self
    }

    /// Sets the grading method.
    #[must_use]
    pub fn with_grading(mut self, grading: GradingMethod) -> Self {
        self.grading = grading;
        self
    }

    /// Enables or disables the force completed policy.
    #[must_use]
    pub fn with_force_completed(mut self, enabled: bool) -> Self {
        self.force_completed = enabled;
        self
    }

    /// Sets the new attempt policy.
    #[must_use]
    pub fn with_force_new_attempt(mut self, policy: ForceNewAttempt) -> Self {
        self.force_new_attempt = policy;
        self
    }

    /// Enables autocommit with the given idle delay.
    #[must_use]
    pub fn with_autocommit(mut self, delay: Duration) -> Self {
        self.autocommit = true;
        self.autocommit_delay = delay;
        self
    }

    /// Enables or disables auto-continue after `Finish`.
    #[must_use]
    pub fn with_auto_continue(mut self, enabled: bool) -> Self {
        self.auto_continue = enabled;
        self
    }

    /// Hides or shows the browse mode.
    #[must_use]
    pub fn with_hide_browse(mut self, hide: bool) -> Self {
        self.hide_browse = hide;
        self
    }

    /// Enforces or relaxes string length limits.
    #[must_use]
    pub fn with_strict_strings(mut self, strict: bool) -> Self {
        self.strict_strings = strict;
        self
    }

    /// Sets the SCO list.
    #[must_use]
    pub fn with_scos(mut self, scos: Vec<ScoInfo>) -> Self {
        self.scos = scos;
        self
    }

    /// Returns the SCO with the given id.
    pub fn sco(&self, id: ScoId) -> Option<&ScoInfo> {
        self.scos.iter().find(|sco| sco.id == id)
    }

    /// Returns true if `attempt` is within the attempt cap.
    pub fn allows_attempt(&self, attempt: AttemptNumber) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Binding of a runtime session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// SCO launched first.
    pub sco_id: ScoId,
    /// Attempt number.
    pub attempt: AttemptNumber,
    /// Session mode.
    pub mode: Mode,
    /// Start in offline mode.
    pub offline: bool,
    /// Whether commits persist anything.
    pub can_save_tracks: bool,
}

impl SessionConfig {
    /// Creates a normal, online session.
    pub fn new(sco_id: ScoId, attempt: AttemptNumber) -> Self {
        Self {
            sco_id,
            attempt,
            mode: Mode::Normal,
            offline: false,
            can_save_tracks: true,
        }
    }

    /// Sets the mode. Review sessions never persist tracks.
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self.can_save_tracks = mode != Mode::Review;
        self
    }

    /// Starts the session offline.
    #[must_use]
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_builder() {
        let activity = ActivityConfig::new(3, 7)
            .with_max_attempts(2)
            .with_autocommit(Duration::from_millis(10))
            .with_scos(vec![ScoInfo::new(1, "a.html")]);

        assert!(activity.autocommit);
        assert!(activity.allows_attempt(2));
        assert!(!activity.allows_attempt(3));
        assert_eq!(activity.sco(1).map(|s| s.launch.as_str()), Some("a.html"));
    }

    #[test]
    fn unlimited_attempts() {
        let activity = ActivityConfig::new(1, 1);
        assert!(activity.allows_attempt(1000));
    }

    #[test]
    fn review_sessions_do_not_save() {
        let session = SessionConfig::new(1, 1).with_mode(Mode::Review);
        assert!(!session.can_save_tracks);
    }
}
