//! Property-based test generators using proptest.
//!
//! Every strategy produces values the SCORM 1.2 data model accepts.

use std::collections::BTreeSet;

use cmisync_model::{AttemptNumber, ScoId, ScoUserData, UserDataMap};
use proptest::prelude::*;

/// Lesson status vocabulary.
pub const LESSON_STATUSES: [&str; 5] = ["passed", "completed", "failed", "incomplete", "browsed"];

/// Writable elements with free-form string values.
pub const STRING_ELEMENTS: [&str; 3] = [
    "cmi.core.lesson_location",
    "cmi.suspend_data",
    "cmi.comments",
];

/// Strategy for `CMITime` values (`hh:mm:ss[.cc]`).
pub fn cmi_time_strategy() -> impl Strategy<Value = String> {
    (0u32..24, 0u32..60, 0u32..60, prop::option::of(0u32..100)).prop_map(|(h, m, s, c)| match c {
        Some(c) => format!("{h:02}:{m:02}:{s:02}.{c:02}"),
        None => format!("{h:02}:{m:02}:{s:02}"),
    })
}

/// Strategy for `CMITimespan` values (`hhhh:mm:ss[.cc]`).
pub fn cmi_timespan_strategy() -> impl Strategy<Value = String> {
    (0u32..10_000, 0u32..60, 0u32..60, prop::option::of(0u32..100)).prop_map(
        |(h, m, s, c)| match c {
            Some(c) => format!("{h:04}:{m:02}:{s:02}.{c:02}"),
            None => format!("{h:04}:{m:02}:{s:02}"),
        },
    )
}

/// Strategy for scores inside 0..=100 with up to two decimals.
pub fn score_strategy() -> impl Strategy<Value = String> {
    (0u32..=100, 0u32..100, any::<bool>()).prop_map(|(whole, fraction, decimals)| {
        if decimals && whole < 100 {
            format!("{whole}.{fraction:02}")
        } else {
            whole.to_string()
        }
    })
}

/// Strategy for lesson statuses.
pub fn lesson_status_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(LESSON_STATUSES.to_vec()).prop_map(str::to_string)
}

/// Strategy for `CMIIdentifier` values.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_-]{1,32}").expect("Invalid regex")
}

/// Strategy for the data of one SCO: a status, a score and some strings.
pub fn sco_user_data_strategy(sco_id: ScoId) -> impl Strategy<Value = ScoUserData> {
    (
        lesson_status_strategy(),
        prop::option::of(score_strategy()),
        prop::collection::btree_map(
            prop::sample::select(STRING_ELEMENTS.to_vec()),
            "[a-z0-9=;]{0,16}",
            0..3,
        ),
    )
        .prop_map(move |(status, score, strings)| {
            let mut sco = ScoUserData::new(sco_id)
                .with_value("cmi.core.lesson_status", status.clone())
                .with_value("status", status);
            if let Some(score) = score {
                sco = sco
                    .with_value("cmi.core.score.raw", score.clone())
                    .with_value("score_raw", score);
            }
            for (element, value) in strings {
                sco = sco.with_value(element, value);
            }
            sco
        })
}

/// Strategy for user data of SCOs `1..=sco_count`.
pub fn user_data_strategy(sco_count: ScoId) -> impl Strategy<Value = UserDataMap> {
    let scos: Vec<_> = (1..=sco_count).map(sco_user_data_strategy).collect();
    scos.prop_map(|scos| scos.into_iter().map(|sco| (sco.sco_id, sco)).collect())
}

/// Strategy for a non-empty set of attempt numbers up to `max`.
pub fn attempt_numbers_strategy(max: AttemptNumber) -> impl Strategy<Value = BTreeSet<AttemptNumber>> {
    prop::collection::btree_set(1..=max, 1..=max as usize)
}
