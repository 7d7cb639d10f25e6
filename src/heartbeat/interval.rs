//! Interval parsing for duration strings like "30m", "1h", "2h30m".

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::ScheduleError;

/// Default interval when no value is configured.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// One `<number><unit>` token, optionally followed by whitespace.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*([dhms])\s*").expect("interval token regex is valid")
});

/// Parse a duration string into a [`Duration`].
///
/// Supports one or more `<number><unit>` tokens with units `d`, `h`, `m`, `s`
/// (case-insensitive), integer or decimal numbers, and optional whitespace
/// between tokens. Repeated units accumulate, so `"1h1h"` is two hours.
///
/// `None`, empty, or whitespace-only input yields the 30-minute default.
pub fn parse_interval(duration: Option<&str>) -> Result<Duration, ScheduleError> {
    let raw = match duration {
        Some(s) if !s.trim().is_empty() => s.trim(),
        _ => return Ok(DEFAULT_INTERVAL),
    };

    // Reject negatives before looking at individual tokens.
    if raw.contains('-') {
        return Err(ScheduleError::NonPositive { input: raw.to_string() });
    }

    let lowered = raw.to_lowercase();
    let mut rest = lowered.as_str();
    let mut total_secs = 0.0_f64;
    let mut matched_any = false;

    while let Some(caps) = TOKEN.captures(rest) {
        matched_any = true;
        let value: f64 = caps[1]
            .parse()
            .map_err(|_| ScheduleError::InvalidFormat { input: raw.to_string() })?;
        if value <= 0.0 {
            return Err(ScheduleError::NonPositive {
                input: format!("{}{}", &caps[1], &caps[2]),
            });
        }
        let unit_secs = match &caps[2] {
            "d" => 86_400.0,
            "h" => 3_600.0,
            "m" => 60.0,
            _ => 1.0,
        };
        total_secs += value * unit_secs;
        rest = &rest[caps[0].len()..];
    }

    // The whole string must be consumed by valid tokens.
    if !matched_any || !rest.is_empty() {
        return Err(ScheduleError::InvalidFormat { input: raw.to_string() });
    }

    Ok(Duration::from_secs_f64(total_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minutes_only() {
        assert_eq!(parse_interval(Some("30m")).unwrap(), Duration::from_secs(1800));
    }

    #[test]
    fn parses_hours_only() {
        assert_eq!(parse_interval(Some("1h")).unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn parses_seconds_only() {
        assert_eq!(parse_interval(Some("45s")).unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn parses_days_only() {
        assert_eq!(parse_interval(Some("2d")).unwrap(), Duration::from_secs(2 * 86_400));
    }

    #[test]
    fn parses_combined_hours_minutes() {
        assert_eq!(parse_interval(Some("2h30m")).unwrap(), Duration::from_secs(150 * 60));
    }

    #[test]
    fn parses_complex_combination() {
        let expected = 86_400 + 12 * 3600 + 30 * 60 + 45;
        assert_eq!(
            parse_interval(Some("1d12h30m45s")).unwrap(),
            Duration::from_secs(expected)
        );
    }

    #[test]
    fn repeated_units_accumulate() {
        assert_eq!(parse_interval(Some("1h1h")).unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn empty_string_uses_default() {
        assert_eq!(parse_interval(Some("")).unwrap(), DEFAULT_INTERVAL);
    }

    #[test]
    fn none_uses_default() {
        assert_eq!(parse_interval(None).unwrap(), DEFAULT_INTERVAL);
    }

    #[test]
    fn whitespace_only_uses_default() {
        assert_eq!(parse_interval(Some("   ")).unwrap(), DEFAULT_INTERVAL);
    }

    #[test]
    fn invalid_format_is_rejected() {
        assert!(matches!(
            parse_interval(Some("soon")),
            Err(ScheduleError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn unknown_unit_is_rejected() {
        assert!(matches!(
            parse_interval(Some("5x")),
            Err(ScheduleError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(matches!(
            parse_interval(Some("5m later")),
            Err(ScheduleError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn negative_value_is_rejected() {
        assert!(matches!(
            parse_interval(Some("-5m")),
            Err(ScheduleError::NonPositive { .. })
        ));
    }

    #[test]
    fn zero_value_is_rejected() {
        assert!(matches!(
            parse_interval(Some("0m")),
            Err(ScheduleError::NonPositive { .. })
        ));
    }

    #[test]
    fn parses_float_values() {
        assert_eq!(parse_interval(Some("1.5h")).unwrap(), Duration::from_secs(5400));
    }

    #[test]
    fn parses_large_numbers() {
        assert_eq!(parse_interval(Some("365d")).unwrap(), Duration::from_secs(365 * 86_400));
    }

    #[test]
    fn parsing_is_case_insensitive() {
        assert_eq!(parse_interval(Some("2H30M")).unwrap(), Duration::from_secs(150 * 60));
    }

    #[test]
    fn allows_spaces_between_tokens() {
        assert_eq!(parse_interval(Some("2h 30m")).unwrap(), Duration::from_secs(150 * 60));
    }
}
