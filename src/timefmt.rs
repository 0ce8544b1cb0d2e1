//! Timestamp and duration formatting
//!
//! All timezone arithmetic in the crate goes through this module. Instants are
//! stored as UTC; a timezone is only applied when rendering a wall clock for a
//! platform or when reading a wall clock that the user typed without a zone.

use crate::{RelayError, Result};
use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;

/// Format accepted by the Jira worklog `started` field
const TRACKER_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000%z";

/// Naive layouts accepted for wall-clock input, most specific first
const WALL_CLOCK_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an IANA timezone name such as `Asia/Kolkata`
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| RelayError::Config(format!("Unknown timezone: {}", name)))
}

/// Render `instant` as the tracker's absolute timestamp in `tz`
///
/// The wall clock and the offset are both taken from `tz` at that instant, so
/// the emitted string always denotes the same point in time as `instant`.
/// Sub-second precision is dropped.
pub fn to_tracker_timestamp(instant: DateTime<Utc>, tz: Tz) -> String {
    let local = instant.with_timezone(&tz);
    let local = local.with_nanosecond(0).unwrap_or(local);
    local.format(TRACKER_FORMAT).to_string()
}

/// Parse a timestamp produced by [`to_tracker_timestamp`] back into UTC
pub fn parse_tracker_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.3f%z")
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RelayError::Parse(format!("Invalid tracker timestamp '{}': {}", value, e)))
}

/// Parse an ISO-like string into an instant
///
/// Strings carrying `Z` or an explicit offset are taken at face value. Anything
/// else is read as wall-clock digits in `tz`: "2024-03-15T14:00" in
/// `Asia/Kolkata` means 14:00 IST, not 14:00 UTC.
pub fn parse_as_wall_clock(value: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(dt.with_timezone(&Utc));
    }

    for layout in WALL_CLOCK_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, layout) {
            return Ok(local_to_utc(naive, tz));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(local_to_utc(date.and_time(NaiveTime::MIN), tz));
    }

    Err(RelayError::Parse(format!("Invalid timestamp: {}", value)))
}

/// Resolve a wall clock in `tz` to the UTC instant it denotes
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant. Times that
/// fall in a spring-forward gap are moved forward by the length of the gap.
pub fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

/// Parse a workflow post time written as `HH:MM` (or `HH:MM:SS`)
pub fn parse_workflow_time(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| {
            RelayError::Config(format!("Invalid workflow time (expected HH:MM): {}", value))
        })
}

/// The UTC instant at which a workflow posting at `time` in `tz` on `date` happens
pub fn workflow_time_to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    local_to_utc(date.and_time(time), tz)
}

/// Start (inclusive) and end (exclusive) of the UTC calendar day `date`
pub fn utc_day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    (start, start + Duration::days(1))
}

/// Format seconds as `XhYm`, omitting zero components
///
/// Leftover seconds below a full minute are dropped. Non-positive input yields `0m`.
pub fn secs_to_duration(secs: i64) -> String {
    if secs <= 0 {
        return "0m".to_string();
    }
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;

    match (hours, minutes) {
        (0, 0) => "0m".to_string(),
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h{}m", h, m),
    }
}
