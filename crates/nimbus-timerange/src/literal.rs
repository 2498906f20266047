//! ISO-8601 literal parsing for user-supplied dates, datetimes, and times
//! of day.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::TimeRangeError;
use crate::zone::DisplayZone;

/// `HH:MM`, `HH:MM:SS`, optionally followed by a `±HH:MM` offset.
static TIME_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2}):(\d{2})(?::(\d{2}))?(?:([+-]\d{2}):(\d{2}))?$").unwrap()
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse an ISO-8601 date or datetime literal, anchored in the display zone.
///
/// A literal carrying its own offset is converted into the display zone; a
/// naive literal is interpreted as wall-clock time in the display zone. A
/// bare date maps to its midnight.
pub fn parse_datetime(zone: &DisplayZone, text: &str) -> Result<DateTime<FixedOffset>, TimeRangeError> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(zone.anchor(dt.with_timezone(&Utc)));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return zone.from_local(naive);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return zone.from_local(date.and_time(NaiveTime::MIN));
    }
    Err(TimeRangeError::InvalidLiteral(text.to_string()))
}

/// A parsed wall-clock time of day with an optional explicit offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDayLiteral {
    pub time: NaiveTime,
    pub offset: Option<FixedOffset>,
}

impl TimeOfDayLiteral {
    /// Parse `HH:MM[:SS][±HH:MM]`.
    pub fn parse(text: &str) -> Result<Self, TimeRangeError> {
        let text = text.trim();
        let captures = TIME_LITERAL
            .captures(text)
            .ok_or_else(|| TimeRangeError::InvalidLiteral(text.to_string()))?;

        let hour: u32 = captures[1].parse().unwrap();
        let minute: u32 = captures[2].parse().unwrap();
        let second: u32 = captures
            .get(3)
            .map(|m| m.as_str().parse().unwrap())
            .unwrap_or(0);
        let time = NaiveTime::from_hms_opt(hour, minute, second)
            .ok_or_else(|| TimeRangeError::InvalidLiteral(text.to_string()))?;

        let offset = match (captures.get(4), captures.get(5)) {
            (Some(h), Some(m)) => {
                let hours: i32 = h.as_str().parse().unwrap();
                let minutes: i32 = m.as_str().parse().unwrap();
                let seconds = hours * 3600 + hours.signum() * minutes * 60;
                Some(
                    FixedOffset::east_opt(seconds)
                        .ok_or_else(|| TimeRangeError::InvalidLiteral(text.to_string()))?,
                )
            }
            _ => None,
        };

        Ok(Self { time, offset })
    }

    /// Normalize to a UTC time of day. A literal without an explicit offset
    /// is interpreted in the display zone, at its current offset.
    pub fn to_utc(&self, zone: &DisplayZone) -> NaiveTime {
        let offset = self.offset.unwrap_or_else(|| zone.current_offset());
        self.time
            .overflowing_sub_signed(Duration::seconds(offset.local_minus_utc() as i64))
            .0
    }
}
