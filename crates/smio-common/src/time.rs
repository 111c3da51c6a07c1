//! Time handling utilities for cell-file time axes.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Unit of a numeric time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    /// Parse a CF unit word (singular or plural, case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "day" | "days" | "d" => Some(Self::Days),
            "hour" | "hours" | "h" | "hr" | "hrs" => Some(Self::Hours),
            "minute" | "minutes" | "min" | "mins" => Some(Self::Minutes),
            "second" | "seconds" | "s" | "sec" | "secs" => Some(Self::Seconds),
            "millisecond" | "milliseconds" | "ms" => Some(Self::Milliseconds),
            _ => None,
        }
    }

    /// Milliseconds in one unit.
    pub fn millis(&self) -> f64 {
        match self {
            Self::Days => 86_400_000.0,
            Self::Hours => 3_600_000.0,
            Self::Minutes => 60_000.0,
            Self::Seconds => 1_000.0,
            Self::Milliseconds => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Hours => "hours",
            Self::Minutes => "minutes",
            Self::Seconds => "seconds",
            Self::Milliseconds => "milliseconds",
        }
    }
}

/// Decoded `"<unit> since <reference-date>"` attribute of a time variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub reference: NaiveDateTime,
}

impl TimeUnits {
    pub fn new(unit: TimeUnit, reference: NaiveDateTime) -> Self {
        Self { unit, reference }
    }

    /// Parse a units string such as `"days since 1970-01-01 00:00:00"`.
    pub fn parse(units: &str) -> Result<Self, TimeParseError> {
        let trimmed = units.trim();
        let mut parts = trimmed.splitn(3, char::is_whitespace);
        let unit_str = parts.next().unwrap_or_default();
        let since = parts.next().unwrap_or_default();
        let reference_str = parts.next().unwrap_or_default().trim();

        if !since.eq_ignore_ascii_case("since") || reference_str.is_empty() {
            return Err(TimeParseError::InvalidUnits(units.to_string()));
        }

        let unit = TimeUnit::from_str(unit_str)
            .ok_or_else(|| TimeParseError::InvalidUnits(units.to_string()))?;
        let reference = parse_reference_date(reference_str)?;

        Ok(Self { unit, reference })
    }

    /// Convert a numeric offset into an absolute timestamp (millisecond precision).
    pub fn to_datetime(&self, value: f64) -> Result<NaiveDateTime, TimeParseError> {
        if !value.is_finite() {
            return Err(TimeParseError::OutOfRange(value));
        }
        let millis = (value * self.unit.millis()).round();
        if millis.abs() > i64::MAX as f64 / 2.0 {
            return Err(TimeParseError::OutOfRange(value));
        }
        self.reference
            .checked_add_signed(Duration::milliseconds(millis as i64))
            .ok_or(TimeParseError::OutOfRange(value))
    }

    /// Convert an absolute timestamp back into a numeric offset.
    pub fn to_offset(&self, dt: NaiveDateTime) -> f64 {
        (dt - self.reference).num_milliseconds() as f64 / self.unit.millis()
    }
}

impl std::fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} since {}",
            self.unit.as_str(),
            self.reference.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Parse the reference part of a units string.
fn parse_reference_date(s: &str) -> Result<NaiveDateTime, TimeParseError> {
    let cleaned = s
        .trim_end_matches("UTC")
        .trim_end_matches('Z')
        .trim()
        .replace('T', " ");

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Ok(dt);
        }
    }

    // Date only
    NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| TimeParseError::InvalidFormat(s.to_string()))
}

/// Parse a user-facing timestamp (`YYYY-MM-DD` or full datetime).
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, TimeParseError> {
    parse_reference_date(s)
}

/// A closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Parse `"<from>/<to>"` or `"<from>..<to>"`.
    pub fn parse(s: &str) -> Result<Self, TimeParseError> {
        let (a, b) = s
            .split_once('/')
            .or_else(|| s.split_once(".."))
            .ok_or_else(|| TimeParseError::InvalidFormat(s.to_string()))?;
        Ok(Self::new(parse_datetime(a)?, parse_datetime(b)?))
    }

    /// Inclusive on both ends.
    pub fn contains(&self, dt: &NaiveDateTime) -> bool {
        dt >= &self.start && dt <= &self.end
    }
}

/// Day of year on a leap-year calendar: Feb 29 is always 60, Mar 1 always 61.
pub fn leap_doy(dt: &NaiveDateTime) -> u32 {
    const CUMULATIVE: [u32; 12] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];
    CUMULATIVE[dt.month0() as usize] + dt.day()
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Invalid time units: {0}")]
    InvalidUnits(String),

    #[error("Time value {0} cannot be represented")]
    OutOfRange(f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_days_since() {
        let units = TimeUnits::parse("days since 1900-01-01 00:00:00").unwrap();
        assert_eq!(units.unit, TimeUnit::Days);
        assert_eq!(units.reference, ymd(1900, 1, 1));

        let dt = units.to_datetime(1.5).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(1900, 1, 2).unwrap());
        assert_eq!(dt.hour(), 12);
    }

    #[test]
    fn test_parse_variants() {
        assert!(TimeUnits::parse("Hours since 2000-01-01T06:00:00Z").is_ok());
        assert!(TimeUnits::parse("seconds since 1970-01-01").is_ok());
        assert!(TimeUnits::parse("fortnights since 1970-01-01").is_err());
        assert!(TimeUnits::parse("days after 1970-01-01").is_err());
        assert!(TimeUnits::parse("days since").is_err());
        assert!(TimeUnits::parse("days since yesterday").is_err());
    }

    #[test]
    fn test_reference_epoch_is_not_hardcoded() {
        let a = TimeUnits::parse("days since 1970-01-01").unwrap();
        let b = TimeUnits::parse("days since 2000-01-01").unwrap();
        assert_ne!(a.to_datetime(10.0).unwrap(), b.to_datetime(10.0).unwrap());
        assert_eq!(b.to_datetime(10.0).unwrap(), ymd(2000, 1, 11));
    }

    #[test]
    fn test_offset_roundtrip() {
        let units = TimeUnits::parse("hours since 2010-06-01").unwrap();
        let dt = units.to_datetime(36.0).unwrap();
        assert_eq!(units.to_offset(dt), 36.0);
    }

    #[test]
    fn test_nan_is_out_of_range() {
        let units = TimeUnits::parse("days since 1970-01-01").unwrap();
        assert!(units.to_datetime(f64::NAN).is_err());
    }

    #[test]
    fn test_date_range() {
        let range = DateRange::parse("2010-01-01/2010-12-31").unwrap();
        assert!(range.contains(&ymd(2010, 1, 1)));
        assert!(range.contains(&ymd(2010, 12, 31)));
        assert!(!range.contains(&ymd(2011, 1, 1)));
        assert!(DateRange::parse("1991-01-01..2010-12-31").is_ok());
    }

    #[test]
    fn test_leap_doy() {
        assert_eq!(leap_doy(&ymd(2001, 1, 1)), 1);
        assert_eq!(leap_doy(&ymd(2000, 2, 29)), 60);
        assert_eq!(leap_doy(&ymd(2001, 3, 1)), 61);
        assert_eq!(leap_doy(&ymd(2000, 3, 1)), 61);
        assert_eq!(leap_doy(&ymd(2001, 12, 31)), 366);
    }
}
