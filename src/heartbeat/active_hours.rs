//! Active-hours window checking with timezone support.
//!
//! A window is a string like `"09:00-17:00"` or `"9-17"`, interpreted in a
//! configured IANA timezone. Windows where the end is not after the start are
//! treated as spanning midnight (`"22:00-06:00"`).

use std::sync::LazyLock;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::ScheduleError;

static WINDOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*-\s*(.+?)$").expect("window regex is valid"));

/// Parse one side of a window: `H`, `HH`, `H:MM`, or `HH:MM`.
fn parse_time(input: &str) -> Result<NaiveTime, ScheduleError> {
    let input = input.trim();
    let invalid = || ScheduleError::InvalidFormat { input: input.to_string() };

    let (hour, minute) = match input.split_once(':') {
        Some((h, m)) => {
            if m.contains(':') {
                return Err(invalid());
            }
            (
                h.trim().parse::<u32>().map_err(|_| invalid())?,
                m.trim().parse::<u32>().map_err(|_| invalid())?,
            )
        }
        None => (input.parse::<u32>().map_err(|_| invalid())?, 0),
    };

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Parse an active-hours window into `(start, end)` times of day.
pub fn parse_active_hours(window: &str) -> Result<(NaiveTime, NaiveTime), ScheduleError> {
    let window = window.trim();
    let caps = WINDOW
        .captures(window)
        .ok_or_else(|| ScheduleError::InvalidFormat { input: window.to_string() })?;

    Ok((parse_time(&caps[1])?, parse_time(&caps[2])?))
}

/// Check whether the current time falls inside an active-hours window.
///
/// `window` of `None` or blank means no restriction. The comparison is
/// time-of-day only: the start boundary is inclusive and the end boundary is
/// exclusive. `now` defaults to the real clock and exists for tests.
pub fn is_within_active_hours(
    window: Option<&str>,
    timezone: &str,
    now: Option<DateTime<Utc>>,
) -> Result<bool, ScheduleError> {
    let window = match window {
        Some(w) if !w.trim().is_empty() => w,
        _ => return Ok(true),
    };

    let (start, end) = parse_active_hours(window)?;

    let zone: Tz = timezone
        .parse()
        .map_err(|_| ScheduleError::UnknownTimezone { name: timezone.to_string() })?;
    let current = now.unwrap_or_else(Utc::now).with_timezone(&zone).time();

    // End at or before start means the window spans midnight.
    if end <= start {
        Ok(current >= start || current < end)
    } else {
        Ok(current >= start && current < end)
    }
}
