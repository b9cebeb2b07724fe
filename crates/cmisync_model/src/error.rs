//! Error types for the runtime data model.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SCORM 1.2 runtime error codes.
///
/// These are protocol results, not Rust errors: every API call stores one
/// and content reads it back with `GetLastError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorCode {
    /// 0: the last call succeeded.
    #[default]
    NoError,
    /// 101: general exception, also used for a repeated `Initialize`.
    GeneralException,
    /// 201: invalid argument or undefined element.
    InvalidArgument,
    /// 202: the element cannot have children.
    CannotHaveChildren,
    /// 203: the element is not an array and cannot have a count.
    NotAnArray,
    /// 301: the session is not initialized.
    NotInitialized,
    /// 401: not implemented.
    NotImplemented,
    /// 402: the element is a keyword and cannot be set.
    KeywordElement,
    /// 403: the element is read only.
    ReadOnly,
    /// 404: the element is write only.
    WriteOnly,
    /// 405: incorrect data type, including out of range numbers.
    IncorrectDataType,
}

impl ErrorCode {
    /// Every defined code, in numeric order.
    pub const ALL: [ErrorCode; 11] = [
        ErrorCode::NoError,
        ErrorCode::GeneralException,
        ErrorCode::InvalidArgument,
        ErrorCode::CannotHaveChildren,
        ErrorCode::NotAnArray,
        ErrorCode::NotInitialized,
        ErrorCode::NotImplemented,
        ErrorCode::KeywordElement,
        ErrorCode::ReadOnly,
        ErrorCode::WriteOnly,
        ErrorCode::IncorrectDataType,
    ];

    /// Returns the numeric code.
    pub fn code(self) -> u16 {
        match self {
            ErrorCode::NoError => 0,
            ErrorCode::GeneralException => 101,
            ErrorCode::InvalidArgument => 201,
            ErrorCode::CannotHaveChildren => 202,
            ErrorCode::NotAnArray => 203,
            ErrorCode::NotInitialized => 301,
            ErrorCode::NotImplemented => 401,
            ErrorCode::KeywordElement => 402,
            ErrorCode::ReadOnly => 403,
            ErrorCode::WriteOnly => 404,
            ErrorCode::IncorrectDataType => 405,
        }
    }

    /// Looks a code up by its numeric value.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Returns the standard message for this code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::NoError => "No error",
            ErrorCode::GeneralException => "General exception",
            ErrorCode::InvalidArgument => "Invalid argument error",
            ErrorCode::CannotHaveChildren => "Element cannot have children",
            ErrorCode::NotAnArray => "Element not an array - cannot have count",
            ErrorCode::NotInitialized => "Not initialized",
            ErrorCode::NotImplemented => "Not implemented error",
            ErrorCode::KeywordElement => "Invalid set value, element is a keyword",
            ErrorCode::ReadOnly => "Element is read only",
            ErrorCode::WriteOnly => "Element is write only",
            ErrorCode::IncorrectDataType => "Incorrect data type",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors reported by a [`crate::TrackSink`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The destination could not be reached.
    #[error("track destination unavailable: {0}")]
    Unavailable(String),

    /// The destination refused the batch.
    #[error("track batch rejected: {0}")]
    Rejected(String),

    /// The write queue is full.
    #[error("write queue is full")]
    QueueFull,

    /// The write queue worker has stopped.
    #[error("write queue is closed")]
    Closed,
}

/// A malformed `hh:mm:ss[.cc]` value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid time value: {0:?}")]
pub struct TimeError(pub String);

/// A malformed prerequisites expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid prerequisites at offset {position}: {message}")]
pub struct PrerequisiteError {
    /// Byte offset where parsing failed.
    pub position: usize,
    /// What was expected.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_numbers() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::from_code(code.code()), Some(code));
        }
        assert_eq!(ErrorCode::from_code(999), None);
    }

    #[test]
    fn display_is_numeric() {
        assert_eq!(ErrorCode::IncorrectDataType.to_string(), "405");
        assert_eq!(ErrorCode::NoError.to_string(), "0");
    }

    #[test]
    fn messages_match_standard_strings() {
        assert_eq!(ErrorCode::NotAnArray.message(), "Element not an array - cannot have count");
        assert_eq!(
            ErrorCode::KeywordElement.message(),
            "Invalid set value, element is a keyword"
        );
    }
}
