//! nimbus-timerange: time-range resolution for word-cloud queries.
//!
//! Converts user-facing range keywords ("today", "last month", …) and
//! ISO-8601 literals into concrete half-open `[start, stop)` intervals,
//! anchored in the configured display timezone and normalized to UTC at the
//! storage boundary.

pub mod literal;
pub mod zone;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use literal::{TimeOfDayLiteral, parse_datetime};
pub use zone::DisplayZone;

#[derive(Debug, thiserror::Error)]
pub enum TimeRangeError {
    /// Malformed date/time text from a user; callers re-prompt.
    #[error("Invalid date or time literal: {0}")]
    InvalidLiteral(String),
    /// The keyword needs a literal that was not supplied; callers prompt.
    #[error("A date or date range is required")]
    MissingArgument,
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

/// User-facing time-range keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKeyword {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisYear,
    History,
}

/// A resolved half-open interval `[start, stop)`.
///
/// Instants stay timezone-aware for display; `*_utc` accessors feed storage
/// queries. Ephemeral — recomputed per request, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTimeRange {
    pub start: DateTime<FixedOffset>,
    pub stop: DateTime<FixedOffset>,
}

impl ResolvedTimeRange {
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    pub fn stop_utc(&self) -> DateTime<Utc> {
        self.stop.with_timezone(&Utc)
    }
}

/// Splits a history literal into its `A` and optional `B` halves of `A~B`.
static HISTORY_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)(?:~(.+))?$").unwrap());

/// Resolve a range keyword against `now` (already anchored in `zone`).
///
/// `literal` is only consulted for [`RangeKeyword::History`]: a bare date
/// covers that whole day, `A~B` is used exactly as parsed.
pub fn resolve(
    zone: &DisplayZone,
    keyword: RangeKeyword,
    now: DateTime<FixedOffset>,
    literal: Option<&str>,
) -> Result<ResolvedTimeRange, TimeRangeError> {
    let midnight = zone.from_local(now.date_naive().and_time(NaiveTime::MIN))?;

    let range = match keyword {
        RangeKeyword::Today => ResolvedTimeRange {
            start: midnight,
            stop: now,
        },
        RangeKeyword::Yesterday => ResolvedTimeRange {
            start: midnight - Duration::days(1),
            stop: midnight,
        },
        RangeKeyword::ThisWeek => ResolvedTimeRange {
            start: midnight - Duration::days(now.weekday().num_days_from_monday() as i64),
            stop: now,
        },
        RangeKeyword::LastWeek => {
            let week_start =
                midnight - Duration::days(now.weekday().num_days_from_monday() as i64);
            ResolvedTimeRange {
                start: week_start - Duration::days(7),
                stop: week_start,
            }
        }
        RangeKeyword::ThisMonth => ResolvedTimeRange {
            start: month_start(zone, now)?,
            stop: now,
        },
        RangeKeyword::LastMonth => {
            // The instant just before the first of the current month,
            // re-floored to its own month start.
            let stop = month_start(zone, now)? - Duration::microseconds(1);
            ResolvedTimeRange {
                start: month_start(zone, stop)?,
                stop,
            }
        }
        RangeKeyword::ThisYear => {
            let jan_first = now
                .date_naive()
                .with_month(1)
                .and_then(|d| d.with_day(1))
                .expect("January 1st always exists");
            ResolvedTimeRange {
                start: zone.from_local(jan_first.and_time(NaiveTime::MIN))?,
                stop: now,
            }
        }
        RangeKeyword::History => return resolve_history(zone, literal),
    };

    Ok(range)
}

fn month_start(
    zone: &DisplayZone,
    instant: DateTime<FixedOffset>,
) -> Result<DateTime<FixedOffset>, TimeRangeError> {
    let first = instant
        .date_naive()
        .with_day(1)
        .expect("day 1 always exists");
    zone.from_local(first.and_time(NaiveTime::MIN))
}

fn resolve_history(
    zone: &DisplayZone,
    literal: Option<&str>,
) -> Result<ResolvedTimeRange, TimeRangeError> {
    let text = literal.ok_or(TimeRangeError::MissingArgument)?.trim();
    let captures = HISTORY_LITERAL
        .captures(text)
        .ok_or_else(|| TimeRangeError::InvalidLiteral(text.to_string()))?;

    let start = parse_datetime(zone, &captures[1])?;
    let range = match captures.get(2) {
        Some(stop) => ResolvedTimeRange {
            start,
            stop: parse_datetime(zone, stop.as_str())?,
        },
        None => {
            // A lone date means that whole day.
            let day_start = zone.from_local(start.date_naive().and_time(NaiveTime::MIN))?;
            ResolvedTimeRange {
                start: day_start,
                stop: day_start + Duration::days(1),
            }
        }
    };
    Ok(range)
}
