//! Activity grade from online attempt scores.

use std::collections::BTreeMap;

use cmisync_model::{AttemptNumber, GradingMethod};
use serde::{Deserialize, Serialize};

/// Score of one online attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttemptGrade {
    /// Attempt number.
    pub number: AttemptNumber,
    /// Attempt score.
    pub score: f64,
    /// Whether some SCO of the attempt is completed or passed.
    pub has_completed_passed_sco: bool,
}

/// Combines attempt scores into the activity grade.
///
/// Returns `None` when there is nothing to grade. `Last` uses the last
/// attempt with a completed or passed SCO, falling back to attempt 1.
pub fn calculate_grade(
    method: GradingMethod,
    attempts: &BTreeMap<AttemptNumber, AttemptGrade>,
) -> Option<f64> {
    if attempts.is_empty() {
        return None;
    }

    match method {
        GradingMethod::First => attempts.get(&1).map(|a| a.score),
        GradingMethod::Last => attempts
            .values()
            .filter(|a| a.has_completed_passed_sco)
            .max_by_key(|a| a.number)
            .or_else(|| attempts.get(&1))
            .map(|a| a.score),
        GradingMethod::Highest => Some(attempts.values().fold(0.0_f64, |best, a| best.max(a.score))),
        GradingMethod::Average => {
            let sum: f64 = attempts.values().map(|a| a.score).sum();
            #[allow(clippy::cast_precision_loss)]
            let count = attempts.len() as f64;
            Some((sum / count).round())
        }
    }
}
