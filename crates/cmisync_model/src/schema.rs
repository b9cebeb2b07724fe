//! The SCORM 1.2 element table.
//!
//! Elements are looked up by their generic form, where every collection
//! index is replaced by `n` (`cmi.interactions.3.id` becomes
//! `cmi.interactions.n.id`).

use std::borrow::Cow;
use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ErrorCode;

/// Children of `cmi`.
pub const CMI_CHILDREN: &str =
    "core,suspend_data,launch_data,comments,objectives,student_data,student_preference,interactions";
/// Children of `cmi.core`.
pub const CORE_CHILDREN: &str = "student_id,student_name,lesson_location,credit,lesson_status,entry,score,total_time,lesson_mode,exit,session_time";
/// Children of every `score` element.
pub const SCORE_CHILDREN: &str = "raw,min,max";
/// Children of `cmi.evaluation.comments`.
pub const COMMENTS_CHILDREN: &str = "content,location,time";
/// Children of `cmi.objectives`.
pub const OBJECTIVES_CHILDREN: &str = "id,score,status";
/// Children of `cmi.student_data`.
pub const STUDENT_DATA_CHILDREN: &str = "mastery_score,max_time_allowed,time_limit_action";
/// Children of `cmi.student_preference`.
pub const STUDENT_PREFERENCE_CHILDREN: &str = "audio,language,speed,text";
/// Children of `cmi.interactions`.
pub const INTERACTIONS_CHILDREN: &str =
    "id,objectives,time,type,correct_responses,weighting,student_response,result,latency";
/// Value of `cmi._version`.
pub const CMI_VERSION: &str = "3.4";

/// Length limit of string elements when strings are not strictly checked.
pub const RELAXED_STRING_LIMIT: usize = 64_000;

static INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[._](\d+)\.").expect("valid index pattern"));

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).expect("valid format pattern"));
    };
}

pattern!(TIME, r"^([0-2][0-9]):([0-5][0-9]):([0-5][0-9])(\.[0-9]{1,2})?$");
pattern!(TIMESPAN, r"^([0-9]{2,4}):([0-9]{2}):([0-9]{2})(\.[0-9]{1,2})?$");
pattern!(SINTEGER, r"^-?[0-9]+$");
pattern!(DECIMAL, r"^-?[0-9]{0,3}(\.[0-9]*)?$");
pattern!(IDENTIFIER, r"^[\x21-\x7E]{0,255}$");
pattern!(STATUS, r"^(passed|completed|failed|incomplete|browsed)$");
pattern!(STATUS_2, r"^(passed|completed|failed|incomplete|browsed|not attempted)$");
pattern!(EXIT, r"^(time-out|suspend|logout|)$");
pattern!(
    INTERACTION_TYPE,
    r"^(true-false|choice|fill-in|matching|performance|sequencing|likert|numeric)$"
);
pattern!(
    INTERACTION_RESULT,
    r"^(correct|wrong|unanticipated|neutral|[0-9]{0,3}(\.[0-9]*)?)$"
);
pattern!(NAV_EVENT, r"^(previous|continue)$");

/// Who may access an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// `GetValue` only.
    Read,
    /// `SetValue` only.
    Write,
    /// Both.
    ReadWrite,
}

impl Access {
    /// Returns true if `GetValue` is allowed.
    pub fn readable(self) -> bool {
        self != Access::Write
    }

    /// Returns true if `SetValue` is allowed.
    pub fn writable(self) -> bool {
        self != Access::Read
    }
}

/// CMI data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// `CMIString256`.
    String256,
    /// `CMIString4096`.
    String4096,
    /// `CMITime`, `hh:mm:ss[.cc]` on a clock.
    Time,
    /// `CMITimespan`, `hhhh:mm:ss[.cc]` elapsed.
    Timespan,
    /// `CMISInteger`.
    SInteger,
    /// `CMIDecimal`.
    Decimal,
    /// `CMIIdentifier`.
    Identifier,
    /// `CMIFeedback`.
    Feedback,
    /// Lesson status vocabulary.
    Status,
    /// Objective status vocabulary, including `not attempted`.
    Status2,
    /// Exit vocabulary.
    Exit,
    /// Interaction type vocabulary.
    InteractionType,
    /// Interaction result vocabulary or a decimal.
    InteractionResult,
    /// Navigation request vocabulary.
    NavEvent,
}

impl ValueFormat {
    /// Returns true if `value` is a valid instance of this type.
    pub fn matches(self, value: &str, strict_strings: bool) -> bool {
        let string_limit = if strict_strings { 255 } else { RELAXED_STRING_LIMIT };
        match self {
            ValueFormat::String256 | ValueFormat::Feedback => value.chars().count() <= string_limit,
            ValueFormat::String4096 => {
                value.chars().count() <= if strict_strings { 4096 } else { RELAXED_STRING_LIMIT }
            }
            ValueFormat::Time => TIME.is_match(value),
            ValueFormat::Timespan => TIMESPAN.is_match(value),
            ValueFormat::SInteger => SINTEGER.is_match(value),
            ValueFormat::Decimal => DECIMAL.is_match(value),
            ValueFormat::Identifier => IDENTIFIER.is_match(value),
            ValueFormat::Status => STATUS.is_match(value),
            ValueFormat::Status2 => STATUS_2.is_match(value),
            ValueFormat::Exit => EXIT.is_match(value),
            ValueFormat::InteractionType => INTERACTION_TYPE.is_match(value),
            ValueFormat::InteractionResult => INTERACTION_RESULT.is_match(value),
            ValueFormat::NavEvent => NAV_EVENT.is_match(value),
        }
    }
}

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    /// Lowest accepted value.
    pub min: f64,
    /// Highest accepted value.
    pub max: f64,
}

impl Range {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Returns true if `value` parses to a number inside the range.
    ///
    /// An empty value counts as zero.
    pub fn accepts(&self, value: &str) -> bool {
        self.normalize(value).is_some()
    }

    /// Returns the number `value` stands for, written in its shortest form
    /// (`""` is `"0"`, `"075.50"` is `"75.5"`), or `None` if it is outside
    /// the range.
    pub fn normalize(&self, value: &str) -> Option<String> {
        let trimmed = value.trim();
        let number = if trimmed.is_empty() {
            0.0
        } else {
            trimmed.parse::<f64>().ok()?
        };
        if !(number >= self.min && number <= self.max) {
            return None;
        }
        // Drops the sign of negative zero.
        Some(format!("{}", number + 0.0))
    }
}

const SCORE_RANGE: Range = Range::new(0.0, 100.0);
const AUDIO_RANGE: Range = Range::new(-1.0, 100.0);
const SPEED_RANGE: Range = Range::new(-100.0, 100.0);
const WEIGHTING_RANGE: Range = Range::new(-100.0, 100.0);
const TEXT_RANGE: Range = Range::new(-1.0, 1.0);

/// Where the initial value of an element comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    /// No initial value.
    None,
    /// A constant.
    Fixed(&'static str),
    /// The SCO's launch defaults (`defaultdata`).
    Launch,
}

/// Validation metadata of one generic element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementSchema {
    /// Access mode.
    pub access: Access,
    /// Value type, if writes are validated.
    pub format: Option<ValueFormat>,
    /// Numeric range, if any.
    pub range: Option<Range>,
    /// Error reported by a forbidden read.
    pub read_error: Option<ErrorCode>,
    /// Error reported by a forbidden or invalid write.
    pub write_error: ErrorCode,
    /// Initial value source.
    pub default: DefaultValue,
}

impl ElementSchema {
    fn keyword(default: DefaultValue) -> Self {
        Self {
            access: Access::Read,
            format: None,
            range: None,
            read_error: None,
            write_error: ErrorCode::KeywordElement,
            default,
        }
    }

    fn read_only(default: DefaultValue) -> Self {
        Self {
            access: Access::Read,
            format: None,
            range: None,
            read_error: None,
            write_error: ErrorCode::ReadOnly,
            default,
        }
    }

    fn read_write(format: ValueFormat, default: DefaultValue) -> Self {
        Self {
            access: Access::ReadWrite,
            format: Some(format),
            range: None,
            read_error: None,
            write_error: ErrorCode::IncorrectDataType,
            default,
        }
    }

    fn write_only(format: ValueFormat, default: DefaultValue) -> Self {
        Self {
            access: Access::Write,
            format: Some(format),
            range: None,
            read_error: Some(ErrorCode::WriteOnly),
            write_error: ErrorCode::IncorrectDataType,
            default,
        }
    }

    fn ranged(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }
}

static SCHEMA: Lazy<BTreeMap<&'static str, ElementSchema>> = Lazy::new(build_schema);

fn build_schema() -> BTreeMap<&'static str, ElementSchema> {
    use DefaultValue::{Fixed, Launch, None as NoDefault};
    use ElementSchema as E;
    use ValueFormat as F;

    BTreeMap::from([
        ("cmi._children", E::keyword(Fixed(CMI_CHILDREN))),
        ("cmi._version", E::keyword(Fixed(CMI_VERSION))),
        ("cmi.core._children", E::keyword(Fixed(CORE_CHILDREN))),
        ("cmi.core.student_id", E::read_only(Launch)),
        ("cmi.core.student_name", E::read_only(Launch)),
        ("cmi.core.lesson_location", E::read_write(F::String256, Launch)),
        ("cmi.core.credit", E::read_only(Launch)),
        ("cmi.core.lesson_status", E::read_write(F::Status, Launch)),
        ("cmi.core.entry", E::read_only(Launch)),
        ("cmi.core.score._children", E::keyword(Fixed(SCORE_CHILDREN))),
        ("cmi.core.score.raw", E::read_write(F::Decimal, Launch).ranged(SCORE_RANGE)),
        ("cmi.core.score.max", E::read_write(F::Decimal, Launch).ranged(SCORE_RANGE)),
        ("cmi.core.score.min", E::read_write(F::Decimal, Launch).ranged(SCORE_RANGE)),
        ("cmi.core.total_time", E::read_only(Launch)),
        ("cmi.core.lesson_mode", E::read_only(Launch)),
        ("cmi.core.exit", E::write_only(F::Exit, Launch)),
        ("cmi.core.session_time", E::write_only(F::Timespan, Fixed("00:00:00"))),
        ("cmi.suspend_data", E::read_write(F::String4096, Launch)),
        ("cmi.launch_data", E::read_only(Launch)),
        ("cmi.comments", E::read_write(F::String4096, Launch)),
        ("cmi.evaluation.comments._count", E::keyword(Fixed("0"))),
        ("cmi.evaluation.comments._children", E::keyword(Fixed(COMMENTS_CHILDREN))),
        ("cmi.evaluation.comments.n.content", E::read_write(F::String256, NoDefault)),
        ("cmi.evaluation.comments.n.location", E::read_write(F::String256, NoDefault)),
        ("cmi.evaluation.comments.n.time", E::read_write(F::Time, NoDefault)),
        ("cmi.comments_from_lms", E::read_only(NoDefault)),
        ("cmi.objectives._children", E::keyword(Fixed(OBJECTIVES_CHILDREN))),
        ("cmi.objectives._count", E::keyword(Fixed("0"))),
        ("cmi.objectives.n.id", E::read_write(F::Identifier, NoDefault)),
        ("cmi.objectives.n.score._children", E::keyword(NoDefault)),
        ("cmi.objectives.n.score.raw", E::read_write(F::Decimal, Fixed("")).ranged(SCORE_RANGE)),
        ("cmi.objectives.n.score.min", E::read_write(F::Decimal, Fixed("")).ranged(SCORE_RANGE)),
        ("cmi.objectives.n.score.max", E::read_write(F::Decimal, Fixed("")).ranged(SCORE_RANGE)),
        ("cmi.objectives.n.status", E::read_write(F::Status2, NoDefault)),
        ("cmi.student_data._children", E::keyword(Fixed(STUDENT_DATA_CHILDREN))),
        ("cmi.student_data.mastery_score", E::read_only(Launch)),
        ("cmi.student_data.max_time_allowed", E::read_only(Launch)),
        ("cmi.student_data.time_limit_action", E::read_only(Launch)),
        ("cmi.student_preference._children", E::keyword(Fixed(STUDENT_PREFERENCE_CHILDREN))),
        ("cmi.student_preference.audio", E::read_write(F::SInteger, Launch).ranged(AUDIO_RANGE)),
        ("cmi.student_preference.language", E::read_write(F::String256, Launch)),
        ("cmi.student_preference.speed", E::read_write(F::SInteger, Launch).ranged(SPEED_RANGE)),
        ("cmi.student_preference.text", E::read_write(F::SInteger, Launch).ranged(TEXT_RANGE)),
        ("cmi.interactions._children", E::keyword(Fixed(INTERACTIONS_CHILDREN))),
        ("cmi.interactions._count", E::keyword(Fixed("0"))),
        ("cmi.interactions.n.id", E::write_only(F::Identifier, NoDefault)),
        ("cmi.interactions.n.objectives._count", E::keyword(Fixed("0"))),
        ("cmi.interactions.n.objectives.n.id", E::write_only(F::Identifier, NoDefault)),
        ("cmi.interactions.n.time", E::write_only(F::Time, NoDefault)),
        ("cmi.interactions.n.type", E::write_only(F::InteractionType, NoDefault)),
        ("cmi.interactions.n.correct_responses._count", E::keyword(Fixed("0"))),
        ("cmi.interactions.n.correct_responses.n.pattern", E::write_only(F::Feedback, NoDefault)),
        (
            "cmi.interactions.n.weighting",
            E::write_only(F::Decimal, NoDefault).ranged(WEIGHTING_RANGE),
        ),
        ("cmi.interactions.n.student_response", E::write_only(F::Feedback, NoDefault)),
        ("cmi.interactions.n.result", E::write_only(F::InteractionResult, NoDefault)),
        ("cmi.interactions.n.latency", E::write_only(F::Timespan, NoDefault)),
        ("nav.event", E::write_only(F::NavEvent, Fixed(""))),
    ])
}

/// Returns the metadata of a generic element name.
pub fn lookup(generic: &str) -> Option<&'static ElementSchema> {
    SCHEMA.get(generic)
}

/// Iterates over every generic element and its metadata.
pub fn entries() -> impl Iterator<Item = (&'static str, &'static ElementSchema)> {
    SCHEMA.iter().map(|(name, schema)| (*name, schema))
}

/// Returns true if `element` contains a collection index.
pub fn is_indexed(element: &str) -> bool {
    INDEX.is_match(element)
}

/// Replaces every collection index with `n`.
pub fn generic_name(element: &str) -> Cow<'_, str> {
    INDEX.replace_all(element, ".n.")
}

/// Converts an element to the dotted form (`cmi.objectives_0.id` becomes
/// `cmi.objectives.0.id`).
pub fn dotted_name(element: &str) -> Cow<'_, str> {
    INDEX.replace_all(element, ".${1}.")
}

/// Converts an element to the storage form used by the LMS
/// (`cmi.objectives.0.id` becomes `cmi.objectives_0.id`).
pub fn storage_name(element: &str) -> Cow<'_, str> {
    INDEX.replace_all(element, "_${1}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_name_replaces_nested_indexes() {
        assert_eq!(
            generic_name("cmi.interactions.0.objectives.12.id"),
            "cmi.interactions.n.objectives.n.id"
        );
        assert_eq!(generic_name("cmi.objectives_3.score.raw"), "cmi.objectives.n.score.raw");
        assert_eq!(generic_name("cmi.core.score.raw"), "cmi.core.score.raw");
    }

    #[test]
    fn storage_and_dotted_forms() {
        assert_eq!(
            storage_name("cmi.interactions.0.objectives.1.id"),
            "cmi.interactions_0.objectives_1.id"
        );
        assert_eq!(dotted_name("cmi.interactions_0.objectives_1.id"), "cmi.interactions.0.objectives.1.id");
    }

    #[test]
    fn every_indexed_element_has_a_counter() {
        for (name, _) in entries() {
            if let Some(pos) = name.rfind(".n.") {
                let counter = format!("{}._count", &name[..pos]);
                assert!(lookup(&counter).is_some(), "{counter} missing for {name}");
            }
        }
    }

    #[test]
    fn formats() {
        assert!(ValueFormat::Time.matches("23:59:59.5", true));
        assert!(!ValueFormat::Time.matches("30:00:00", true));
        assert!(ValueFormat::Timespan.matches("0010:05:00.25", true));
        assert!(!ValueFormat::Timespan.matches("1:00:00", true));
        assert!(ValueFormat::Decimal.matches("-12.5", true));
        assert!(!ValueFormat::Decimal.matches("1234", true));
        assert!(ValueFormat::Exit.matches("", true));
        assert!(ValueFormat::Status2.matches("not attempted", true));
        assert!(!ValueFormat::Status.matches("not attempted", true));
        assert!(ValueFormat::InteractionResult.matches("0.75", true));
        assert!(!ValueFormat::Identifier.matches("has space", true));
    }

    #[test]
    fn string_limits_depend_on_strictness() {
        let long = "x".repeat(300);
        assert!(!ValueFormat::String256.matches(&long, true));
        assert!(ValueFormat::String256.matches(&long, false));
    }

    #[test]
    fn ranges_accept_empty_as_zero() {
        assert!(SCORE_RANGE.accepts(""));
        assert!(SCORE_RANGE.accepts("100"));
        assert!(!SCORE_RANGE.accepts("100.5"));
        assert!(!TEXT_RANGE.accepts("2"));
        assert!(!SCORE_RANGE.accepts("."));
    }

    #[test]
    fn range_values_are_stored_as_numbers() {
        assert_eq!(SCORE_RANGE.normalize("").as_deref(), Some("0"));
        assert_eq!(SCORE_RANGE.normalize("075.50").as_deref(), Some("75.5"));
        assert_eq!(SCORE_RANGE.normalize("80").as_deref(), Some("80"));
        assert_eq!(TEXT_RANGE.normalize("-0").as_deref(), Some("0"));
        assert_eq!(AUDIO_RANGE.normalize("-1").as_deref(), Some("-1"));
        assert_eq!(SCORE_RANGE.normalize("101"), None);
    }
}
