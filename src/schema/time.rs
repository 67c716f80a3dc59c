//! Timestamp, time-of-day and interval parsing
//!
//! Payload times arrive in several shapes: bare `HH:MM:SS`, ISO-8601 with a
//! `Z` designator or a numeric offset, and naive ISO-8601. Everything is
//! normalized to a timezone-naive wall-clock instant.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::CadenceError;
use crate::types::NominalTime;

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parser holding the reference date used for bare `HH:MM:SS` values
#[derive(Debug, Clone, Copy)]
pub struct TimeParser {
    reference_date: NaiveDate,
}

impl Default for TimeParser {
    fn default() -> Self {
        Self::today()
    }
}

impl TimeParser {
    /// Bare times of day resolve against the current local date
    pub fn today() -> Self {
        Self {
            reference_date: Local::now().date_naive(),
        }
    }

    /// Bare times of day resolve against `date`
    pub fn with_reference_date(date: NaiveDate) -> Self {
        Self {
            reference_date: date,
        }
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// Parse any accepted timestamp shape into a naive instant
    pub fn parse_timestamp(&self, raw: &str) -> Result<NaiveDateTime, CadenceError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(CadenceError::data("empty timestamp"));
        }

        if let Ok(t) = parse_time_of_day(s) {
            return Ok(self.reference_date.and_time(t));
        }

        // Offset-bearing timestamps keep the wall clock of their own offset
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.naive_local());
        }
        if let Some(dt) = OFFSET_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
        {
            return Ok(dt.naive_local());
        }

        if let Some(dt) = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        {
            return Ok(dt);
        }

        // Date-only values mean midnight
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(|d| d.and_time(NaiveTime::MIN))
            .map_err(|_| CadenceError::data(format!("unparseable timestamp '{}'", raw)))
    }

    /// Parse a schedule slot's nominal time, keeping bare times of day recurring
    pub fn parse_nominal(&self, raw: &str) -> Result<NominalTime, CadenceError> {
        let s = raw.trim();
        if let Ok(t) = parse_time_of_day(s) {
            return Ok(NominalTime::TimeOfDay(t));
        }
        self.parse_timestamp(s).map(NominalTime::Instant)
    }
}

/// Parse `HH:MM:SS` (or `HH:MM`) as a time of day
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, CadenceError> {
    let s = raw.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| CadenceError::data(format!("unparseable time of day '{}'", raw)))
}

/// Parse a dosing interval `[-]HH:MM:SS` into a duration.
///
/// Hours are not limited to 23 so daily or longer intervals can be expressed.
/// A leading `-` negates the whole duration. Zero and negative values are
/// returned as is; callers decide whether such an interval is usable.
pub fn parse_interval(raw: &str) -> Result<Duration, CadenceError> {
    let malformed = || CadenceError::data(format!("interval '{}' is not HH:MM:SS", raw));

    let trimmed = raw.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let parts: Vec<&str> = body.split(':').collect();
    if parts.len() != 3 {
        return Err(malformed());
    }

    let mut fields = [0i64; 3];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        let part = part.trim();
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        *slot = part.parse::<i64>().map_err(|_| malformed())?;
    }

    let [hours, minutes, seconds] = fields;
    if minutes >= 60 || seconds >= 60 {
        return Err(CadenceError::data(format!(
            "interval '{}' has out-of-range minutes or seconds",
            raw
        )));
    }

    let magnitude = Duration::try_hours(hours)
        .and_then(|d| d.checked_add(&Duration::try_minutes(minutes)?))
        .and_then(|d| d.checked_add(&Duration::try_seconds(seconds)?))
        .ok_or_else(|| CadenceError::data(format!("interval '{}' is out of range", raw)))?;

    Ok(if negative { -magnitude } else { magnitude })
}

/// Parse a `YYYY-MM-DD` start date
pub fn parse_date(raw: &str) -> Result<NaiveDate, CadenceError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CadenceError::data(format!("unparseable date '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> TimeParser {
        TimeParser::with_reference_date(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_bare_time_uses_reference_date() {
        let parsed = parser().parse_timestamp("08:15:00").unwrap();
        assert_eq!(parsed, at("2024-03-10 08:15:00"));
    }

    #[test]
    fn test_utc_designator_is_normalized() {
        let parsed = parser().parse_timestamp("2024-01-01T08:10:00Z").unwrap();
        assert_eq!(parsed, at("2024-01-01 08:10:00"));

        let fractional = parser().parse_timestamp("2024-01-01T08:10:00.000Z").unwrap();
        assert_eq!(fractional, at("2024-01-01 08:10:00"));
    }

    #[test]
    fn test_offset_keeps_wall_clock() {
        let parsed = parser().parse_timestamp("2024-01-01T08:10:00+02:00").unwrap();
        assert_eq!(parsed, at("2024-01-01 08:10:00"));
    }

    #[test]
    fn test_naive_iso_forms() {
        assert_eq!(
            parser().parse_timestamp("2024-01-01T14:05:00").unwrap(),
            at("2024-01-01 14:05:00")
        );
        assert_eq!(
            parser().parse_timestamp("2024-01-01 14:05:00.250").unwrap(),
            at("2024-01-01 14:05:00") + Duration::milliseconds(250)
        );
    }

    #[test]
    fn test_garbage_is_data_error() {
        let err = parser().parse_timestamp("yesterday-ish").unwrap_err();
        assert!(matches!(err, CadenceError::Data(_)));
        assert!(parser().parse_timestamp("   ").is_err());
    }

    #[test]
    fn test_nominal_keeps_time_of_day() {
        let nominal = parser().parse_nominal("08:00:00").unwrap();
        assert_eq!(
            nominal,
            NominalTime::TimeOfDay(NaiveTime::from_hms_opt(8, 0, 0).unwrap())
        );

        let instant = parser().parse_nominal("2024-01-01T08:00:00Z").unwrap();
        assert_eq!(instant, NominalTime::Instant(at("2024-01-01 08:00:00")));
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("06:00:00").unwrap(), Duration::hours(6));
        assert_eq!(
            parse_interval("01:30:15").unwrap(),
            Duration::seconds(3600 + 1800 + 15)
        );
        assert_eq!(parse_interval("48:00:00").unwrap(), Duration::hours(48));
        assert_eq!(parse_interval("00:00:00").unwrap(), Duration::zero());
        assert!(parse_interval("6h").is_err());
        assert!(parse_interval("06:75:00").is_err());
        assert!(parse_interval("06:-5:00").is_err());
    }

    #[test]
    fn test_negative_interval_keeps_sign() {
        assert_eq!(parse_interval("-00:30:00").unwrap(), Duration::minutes(-30));
        assert_eq!(parse_interval("-06:00:00").unwrap(), Duration::hours(-6));
        assert_eq!(
            parse_interval("-01:30:15").unwrap(),
            -Duration::seconds(3600 + 1800 + 15)
        );
    }

    #[test]
    fn test_huge_interval_is_data_error() {
        let err = parse_interval("3000000000000:00:00").unwrap_err();
        assert!(matches!(err, CadenceError::Data(_)));
        assert!(parse_interval("99999999999999999999:00:00").is_err());
    }

    #[test]
    fn test_offset_without_seconds_and_date_only() {
        assert_eq!(
            parser().parse_timestamp("2024-01-01T08:10+02:00").unwrap(),
            at("2024-01-01 08:10:00")
        );
        assert_eq!(
            parser().parse_timestamp("2024-01-01T08:10:30+0200").unwrap(),
            at("2024-01-01 08:10:30")
        );
        assert_eq!(
            parser().parse_timestamp("2024-01-05").unwrap(),
            at("2024-01-05 00:00:00")
        );
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-01-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert!(parse_date("01/01/2024").is_err());
    }
}
