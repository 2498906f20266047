//! Display timezone handling.
//!
//! All persisted instants are UTC; conversion into the display zone happens
//! once at this boundary.

use chrono::{
    DateTime, FixedOffset, Local, LocalResult, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::TimeRangeError;

/// The timezone user-facing times are anchored in: a configured IANA zone,
/// or the host's local zone if none is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayZone {
    Named(Tz),
    HostLocal,
}

impl DisplayZone {
    /// Build from the configured timezone name, if any.
    pub fn from_config(name: Option<&str>) -> Result<Self, TimeRangeError> {
        match name {
            Some(name) => name
                .parse::<Tz>()
                .map(Self::Named)
                .map_err(|_| TimeRangeError::UnknownTimezone(name.to_string())),
            None => Ok(Self::HostLocal),
        }
    }

    /// The current instant, anchored in this zone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        match self {
            Self::Named(tz) => Utc::now().with_timezone(tz).fixed_offset(),
            Self::HostLocal => Local::now().fixed_offset(),
        }
    }

    /// Convert a UTC instant into this zone.
    pub fn anchor(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Self::Named(tz) => instant.with_timezone(tz).fixed_offset(),
            Self::HostLocal => instant.with_timezone(&Local).fixed_offset(),
        }
    }

    /// Interpret a naive local datetime in this zone.
    ///
    /// Ambiguous local times (DST fold) take the earlier instant;
    /// nonexistent local times (DST gap) are rejected.
    pub fn from_local(&self, local: NaiveDateTime) -> Result<DateTime<FixedOffset>, TimeRangeError> {
        let resolved = match self {
            Self::Named(tz) => map_local(tz.from_local_datetime(&local)),
            Self::HostLocal => map_local(Local.from_local_datetime(&local)),
        };
        resolved.ok_or_else(|| TimeRangeError::InvalidLiteral(local.to_string()))
    }

    /// The zone's UTC offset at the current instant.
    ///
    /// Used to interpret naive times of day; like the source system, a
    /// time-of-day carries no date, so "the offset today" is the contract.
    pub fn current_offset(&self) -> FixedOffset {
        match self {
            Self::Named(tz) => Utc::now().with_timezone(tz).offset().fix(),
            Self::HostLocal => Local::now().offset().fix(),
        }
    }

    /// Convert a UTC time of day into this zone's wall-clock time of day,
    /// using the zone's current offset.
    pub fn local_time_of_day(&self, utc_time: NaiveTime) -> NaiveTime {
        let offset = self.current_offset();
        utc_time
            .overflowing_add_signed(chrono::Duration::seconds(
                offset.local_minus_utc() as i64
            ))
            .0
    }

    /// Render a UTC time of day as local wall-clock time with offset,
    /// e.g. `22:00:00+08:00`.
    pub fn format_local_time(&self, utc_time: NaiveTime) -> String {
        let offset = self.current_offset();
        format!("{}{}", self.local_time_of_day(utc_time), offset)
    }
}

fn map_local<Z: TimeZone>(result: LocalResult<DateTime<Z>>) -> Option<DateTime<FixedOffset>> {
    match result {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.fixed_offset()),
        LocalResult::None => None,
    }
}
