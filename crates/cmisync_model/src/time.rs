//! `hh:mm:ss[.cc]` arithmetic for session and total time.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use crate::error::TimeError;

/// An elapsed time with centisecond precision.
///
/// Parses `CMITimespan` values and prints them back with two-digit fields;
/// hours grow past two digits when needed and the fraction is omitted when
/// it is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Timespan {
    centis: u64,
}

impl Timespan {
    /// Zero duration.
    pub const ZERO: Timespan = Timespan { centis: 0 };

    /// Creates a timespan from its fields, saturating at the largest value.
    pub fn new(hours: u64, minutes: u64, seconds: u64, centis: u64) -> Self {
        Self::checked_new(hours, minutes, seconds, centis).unwrap_or(Self { centis: u64::MAX })
    }

    /// Creates a timespan from its fields, or `None` if it does not fit.
    pub fn checked_new(hours: u64, minutes: u64, seconds: u64, centis: u64) -> Option<Self> {
        let centis = hours
            .checked_mul(60)?
            .checked_add(minutes)?
            .checked_mul(60)?
            .checked_add(seconds)?
            .checked_mul(100)?
            .checked_add(centis)?;
        Some(Self { centis })
    }

    /// Returns the total number of centiseconds.
    pub fn as_centis(self) -> u64 {
        self.centis
    }
}

impl FromStr for Timespan {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TimeError(s.to_string());
        let (clock, fraction) = match s.split_once('.') {
            Some((clock, fraction)) => (clock, Some(fraction)),
            None => (s, None),
        };

        let fields: Vec<&str> = clock.split(':').collect();
        let [hours, minutes, seconds] = fields.as_slice() else {
            return Err(invalid());
        };
        let number = |field: &str| -> Result<u64, TimeError> {
            if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            field.parse::<u64>().map_err(|_| invalid())
        };

        let centis = match fraction {
            None => 0,
            Some(f) if (1..=2).contains(&f.len()) => {
                let digits = number(f)?;
                if f.len() == 1 {
                    digits * 10
                } else {
                    digits
                }
            }
            Some(_) => return Err(invalid()),
        };

        Timespan::checked_new(
            number(*hours)?,
            number(*minutes)?,
            number(*seconds)?,
            centis,
        )
        .ok_or_else(invalid)
    }
}

impl Add for Timespan {
    type Output = Timespan;

    fn add(self, rhs: Timespan) -> Timespan {
        Timespan {
            centis: self.centis.saturating_add(rhs.centis),
        }
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let centis = self.centis % 100;
        let total_seconds = self.centis / 100;
        let seconds = total_seconds % 60;
        let minutes = (total_seconds / 60) % 60;
        let hours = total_seconds / 3600;

        write!(f, "{hours:02}:{minutes:02}:{seconds:02}")?;
        if centis != 0 {
            write!(f, ".{centis:02}")?;
        }
        Ok(())
    }
}

/// Adds two `hh:mm:ss[.cc]` strings.
///
/// # Errors
///
/// Returns an error if either operand is malformed.
pub fn add_time(first: &str, second: &str) -> Result<String, TimeError> {
    let sum = first.parse::<Timespan>()? + second.parse::<Timespan>()?;
    Ok(sum.to_string())
}
