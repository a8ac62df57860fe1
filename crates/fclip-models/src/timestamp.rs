//! Timestamp codec.
//!
//! Segment boundaries are exchanged as `HH:MM:SS,mmm` strings (the SRT
//! convention) and computed on as seconds. Parsing is strict; formatting
//! is total.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// Millisecond-precision elapsed time within a source video.
///
/// Displays and (de)serializes as `HH:MM:SS,mmm`. Hours grow past two
/// digits when needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Convert seconds to a timestamp, rounding to the nearest millisecond.
    ///
    /// Negative, NaN and infinite inputs clamp to zero.
    pub fn from_secs_f64(seconds: f64) -> Self {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Self::ZERO;
        }
        Self((seconds * 1000.0).round() as u64)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Signed distance `self - earlier` in milliseconds.
    pub fn millis_since(&self, earlier: Timestamp) -> i64 {
        self.0 as i64 - earlier.0 as i64
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / MS_PER_HOUR;
        let minutes = (self.0 % MS_PER_HOUR) / MS_PER_MINUTE;
        let seconds = (self.0 % MS_PER_MINUTE) / MS_PER_SECOND;
        let millis = self.0 % MS_PER_SECOND;
        write!(f, "{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(TimestampError::Empty);
        }

        let invalid = || TimestampError::InvalidFormat(s.to_string());

        let (clock, millis) = s.split_once(',').ok_or_else(invalid)?;
        let mut parts = clock.split(':');
        let (hours, minutes, seconds) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(m), Some(sec), None) => (h, m, sec),
            _ => return Err(invalid()),
        };

        // Extra leading zeros would not survive a round trip through Display.
        let canonical_hours = hours.len() == 2 || (hours.len() > 2 && !hours.starts_with('0'));
        if !canonical_hours || !all_digits(hours) {
            return Err(invalid());
        }
        if minutes.len() != 2 || seconds.len() != 2 || millis.len() != 3 {
            return Err(invalid());
        }
        if !all_digits(minutes) || !all_digits(seconds) || !all_digits(millis) {
            return Err(invalid());
        }

        let hours: u64 = hours.parse().map_err(|_| invalid())?;
        let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
        let seconds: u64 = seconds.parse().map_err(|_| invalid())?;
        let millis: u64 = millis.parse().map_err(|_| invalid())?;

        if minutes >= 60 {
            return Err(TimestampError::OutOfRange {
                component: "minutes",
                value: minutes,
            });
        }
        if seconds >= 60 {
            return Err(TimestampError::OutOfRange {
                component: "seconds",
                value: seconds,
            });
        }

        hours
            .checked_mul(MS_PER_HOUR)
            .and_then(|ms| ms.checked_add(minutes * MS_PER_MINUTE + seconds * MS_PER_SECOND + millis))
            .map(Timestamp)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimestampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.to_string()
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse an `HH:MM:SS,mmm` timestamp to seconds.
///
/// # Examples
/// ```
/// use fclip_models::timestamp::to_seconds;
/// assert_eq!(to_seconds("00:01:30,500").unwrap(), 90.5);
/// assert!(to_seconds("1:30").is_err());
/// ```
pub fn to_seconds(ts: &str) -> Result<f64, TimestampError> {
    ts.parse::<Timestamp>().map(|t| t.as_secs_f64())
}

/// Format seconds as `HH:MM:SS,mmm`, rounding to the nearest millisecond.
///
/// # Examples
/// ```
/// use fclip_models::timestamp::to_timestamp;
/// assert_eq!(to_timestamp(3661.25), "01:01:01,250");
/// assert_eq!(to_timestamp(-4.0), "00:00:00,000");
/// ```
pub fn to_timestamp(seconds: f64) -> String {
    Timestamp::from_secs_f64(seconds).to_string()
}

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Invalid timestamp format '{0}', expected HH:MM:SS,mmm")]
    InvalidFormat(String),

    #[error("Timestamp {component} out of range: {value}")]
    OutOfRange { component: &'static str, value: u64 },
}
