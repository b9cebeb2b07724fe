//! Choosing which attempt a session works on.
//!
//! Everything here is pure: callers gather the inventory and the
//! completion state of the relevant attempts first.

use std::collections::BTreeSet;

use cmisync_model::{ActivityConfig, AttemptNumber, ForceNewAttempt, Mode};
use serde::Serialize;

/// The attempt with the highest number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LastAttempt {
    /// Attempt number, 0 when there are no attempts.
    pub number: AttemptNumber,
    /// Whether the attempt has an offline copy.
    pub offline: bool,
}

/// Online and offline attempts of one learner in one activity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AttemptInventory {
    /// Online attempt numbers, ascending.
    pub online: Vec<AttemptNumber>,
    /// Offline attempt numbers, ascending.
    pub offline: Vec<AttemptNumber>,
    /// Number of distinct attempts.
    pub total: u32,
    /// The highest attempt, offline when both sides have it.
    pub last_attempt: LastAttempt,
}

impl AttemptInventory {
    /// Builds an inventory where online attempts are numbered `1..=online_count`.
    pub fn new(online_count: AttemptNumber, offline: impl IntoIterator<Item = AttemptNumber>) -> Self {
        Self::from_numbers(1..=online_count, offline)
    }

    /// Builds an inventory from explicit attempt numbers.
    pub fn from_numbers(
        online: impl IntoIterator<Item = AttemptNumber>,
        offline: impl IntoIterator<Item = AttemptNumber>,
    ) -> Self {
        let online: BTreeSet<AttemptNumber> = online.into_iter().collect();
        let offline: BTreeSet<AttemptNumber> = offline.into_iter().collect();

        let last_online = online.last().copied().unwrap_or(0);
        let last_attempt = match offline.last() {
            Some(&number) if number >= last_online => LastAttempt {
                number,
                offline: true,
            },
            _ => LastAttempt {
                number: last_online,
                offline: false,
            },
        };
        let total = online.union(&offline).count();

        Self {
            online: online.into_iter().collect(),
            offline: offline.into_iter().collect(),
            total: AttemptNumber::try_from(total).unwrap_or(AttemptNumber::MAX),
            last_attempt,
        }
    }

    /// Returns the highest online attempt number, or 0.
    pub fn last_online(&self) -> AttemptNumber {
        self.online.last().copied().unwrap_or(0)
    }

    /// Returns the attempt numbers present both online and offline.
    pub fn collisions(&self) -> Vec<AttemptNumber> {
        self.offline
            .iter()
            .copied()
            .filter(|attempt| self.online.binary_search(attempt).is_ok())
            .collect()
    }

    /// Returns true if the attempt exists offline.
    pub fn has_offline(&self, attempt: AttemptNumber) -> bool {
        self.offline.binary_search(&attempt).is_ok()
    }
}

/// The attempt a session should continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptChoice {
    /// Attempt number.
    pub number: AttemptNumber,
    /// Whether the offline copy should be used.
    pub offline: bool,
}

/// Picks the attempt to continue.
///
/// An incomplete last online attempt is continued, offline if a copy
/// exists. Otherwise the last attempt is used, clamped to the activity's
/// attempt cap.
pub fn determine_attempt_to_continue(
    activity: &ActivityConfig,
    inventory: &AttemptInventory,
    last_online_incomplete: bool,
) -> AttemptChoice {
    let last_online = inventory.last_online();
    if last_online > 0 && last_online_incomplete {
        return AttemptChoice {
            number: last_online,
            offline: inventory.has_offline(last_online),
        };
    }

    let max = activity.max_attempts;
    if max > 0 && inventory.last_attempt.number > max {
        AttemptChoice {
            number: max,
            offline: inventory.has_offline(max),
        }
    } else {
        AttemptChoice {
            number: inventory.last_attempt.number,
            offline: inventory.last_attempt.offline,
        }
    }
}

/// Mode and attempt a launch ends up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    /// Session mode.
    pub mode: Mode,
    /// Attempt number.
    pub attempt: AttemptNumber,
    /// Whether `attempt` is a new attempt.
    pub new_attempt: bool,
}

/// Decides the mode and attempt of a launch.
///
/// `attempt` is the current attempt (0 when there is none) and
/// `incomplete` its completion state. Learners who cannot save tracks keep
/// their attempt; browse is turned into normal when the activity hides it.
pub fn determine_attempt_and_mode(
    activity: &ActivityConfig,
    mode: Mode,
    attempt: AttemptNumber,
    new_attempt: bool,
    incomplete: bool,
    can_save_tracks: bool,
) -> LaunchPlan {
    if !can_save_tracks {
        let mode = if activity.hide_browse { Mode::Normal } else { mode };
        return LaunchPlan {
            mode,
            attempt,
            new_attempt: false,
        };
    }

    let mut mode = mode;
    if mode == Mode::Browse {
        if activity.hide_browse {
            mode = Mode::Normal;
        } else if attempt == 0 {
            return LaunchPlan {
                mode,
                attempt: 1,
                new_attempt: true,
            };
        } else {
            return LaunchPlan {
                mode,
                attempt,
                new_attempt,
            };
        }
    }

    if activity.force_new_attempt == ForceNewAttempt::Always {
        return LaunchPlan {
            mode: Mode::Normal,
            attempt: attempt + 1,
            new_attempt: true,
        };
    }

    let new_attempt = if attempt == 0 {
        true
    } else if incomplete {
        false
    } else if activity.force_new_attempt == ForceNewAttempt::OnComplete {
        true
    } else {
        new_attempt
    };

    let max = activity.max_attempts;
    if new_attempt && (max == 0 || attempt < max) {
        LaunchPlan {
            mode: Mode::Normal,
            attempt: attempt + 1,
            new_attempt: true,
        }
    } else {
        LaunchPlan {
            mode: if incomplete { Mode::Normal } else { Mode::Review },
            attempt,
            new_attempt: false,
        }
    }
}

/// Returns how many attempts are left, or `None` when attempts are
/// unlimited.
pub fn count_attempts_left(max_attempts: AttemptNumber, used: AttemptNumber) -> Option<AttemptNumber> {
    if max_attempts == 0 {
        None
    } else {
        Some(max_attempts.saturating_sub(used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_counts_shared_attempts_once() {
        let inventory = AttemptInventory::new(3, [2, 4]);
        assert_eq!(inventory.online, vec![1, 2, 3]);
        assert_eq!(inventory.total, 4);
        assert_eq!(inventory.collisions(), vec![2]);
        assert_eq!(
            inventory.last_attempt,
            LastAttempt {
                number: 4,
                offline: true
            }
        );
    }

    #[test]
    fn last_attempt_prefers_offline_copy() {
        let inventory = AttemptInventory::new(2, [2]);
        assert_eq!(
            inventory.last_attempt,
            LastAttempt {
                number: 2,
                offline: true
            }
        );

        let inventory = AttemptInventory::new(0, []);
        assert_eq!(inventory.last_attempt, LastAttempt::default());
    }

    #[test]
    fn continues_incomplete_online_attempt() {
        let activity = ActivityConfig::new(1, 1);
        let inventory = AttemptInventory::new(2, [2, 3]);
        let choice = determine_attempt_to_continue(&activity, &inventory, true);
        assert_eq!(
            choice,
            AttemptChoice {
                number: 2,
                offline: true
            }
        );
    }

    #[test]
    fn continue_is_clamped_to_max_attempts() {
        let activity = ActivityConfig::new(1, 1).with_max_attempts(3);
        let inventory = AttemptInventory::new(2, [3, 4, 5]);
        let choice = determine_attempt_to_continue(&activity, &inventory, false);
        assert_eq!(
            choice,
            AttemptChoice {
                number: 3,
                offline: true
            }
        );

        let inventory = AttemptInventory::new(5, []);
        let choice = determine_attempt_to_continue(&activity, &inventory, false);
        assert_eq!(
            choice,
            AttemptChoice {
                number: 3,
                offline: false
            }
        );
    }

    #[test]
    fn uncapped_continue_uses_last_attempt() {
        let activity = ActivityConfig::new(1, 1);
        let inventory = AttemptInventory::new(1, [2]);
        let choice = determine_attempt_to_continue(&activity, &inventory, false);
        assert_eq!(choice.number, 2);
        assert!(choice.offline);
    }

    #[test]
    fn first_launch_starts_attempt_one() {
        let activity = ActivityConfig::new(1, 1);
        let plan = determine_attempt_and_mode(&activity, Mode::Normal, 0, false, false, true);
        assert_eq!(
            plan,
            LaunchPlan {
                mode: Mode::Normal,
                attempt: 1,
                new_attempt: true
            }
        );
    }

    #[test]
    fn complete_attempt_is_reviewed() {
        let activity = ActivityConfig::new(1, 1);
        let plan = determine_attempt_and_mode(&activity, Mode::Normal, 2, false, false, true);
        assert_eq!(plan.mode, Mode::Review);
        assert_eq!(plan.attempt, 2);

        let plan = determine_attempt_and_mode(&activity, Mode::Normal, 2, true, true, true);
        assert_eq!(plan.mode, Mode::Normal);
        assert!(!plan.new_attempt);
    }

    #[test]
    fn no_attempts_left_forces_review() {
        let activity = ActivityConfig::new(1, 1).with_max_attempts(2);
        let plan = determine_attempt_and_mode(&activity, Mode::Normal, 2, true, false, true);
        assert_eq!(plan.mode, Mode::Review);
        assert_eq!(plan.attempt, 2);
    }

    #[test]
    fn force_new_attempt_policies() {
        let always = ActivityConfig::new(1, 1).with_force_new_attempt(ForceNewAttempt::Always);
        let plan = determine_attempt_and_mode(&always, Mode::Normal, 3, false, true, true);
        assert_eq!(plan.attempt, 4);
        assert!(plan.new_attempt);

        let on_complete =
            ActivityConfig::new(1, 1).with_force_new_attempt(ForceNewAttempt::OnComplete);
        let plan = determine_attempt_and_mode(&on_complete, Mode::Normal, 3, false, false, true);
        assert_eq!(plan.attempt, 4);
        let plan = determine_attempt_and_mode(&on_complete, Mode::Normal, 3, false, true, true);
        assert_eq!(plan.attempt, 3);
    }

    #[test]
    fn browse_mode() {
        let activity = ActivityConfig::new(1, 1);
        let plan = determine_attempt_and_mode(&activity, Mode::Browse, 0, false, false, true);
        assert_eq!(plan.mode, Mode::Browse);
        assert_eq!(plan.attempt, 1);

        let hidden = ActivityConfig::new(1, 1).with_hide_browse(true);
        let plan = determine_attempt_and_mode(&hidden, Mode::Browse, 1, false, true, true);
        assert_eq!(plan.mode, Mode::Normal);

        let plan = determine_attempt_and_mode(&activity, Mode::Browse, 2, true, false, false);
        assert_eq!(plan.mode, Mode::Browse);
        assert!(!plan.new_attempt);
    }

    #[test]
    fn attempts_left() {
        assert_eq!(count_attempts_left(0, 10), None);
        assert_eq!(count_attempts_left(3, 1), Some(2));
        assert_eq!(count_attempts_left(3, 5), Some(0));
    }
}
