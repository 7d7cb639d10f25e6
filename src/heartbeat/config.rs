//! Heartbeat configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ScheduleError, SettingsError};
use crate::heartbeat::active_hours::parse_active_hours;
use crate::heartbeat::interval::parse_interval;

/// Configuration for periodic heartbeat execution.
///
/// The `every` and `active_hours` strings are validated eagerly by
/// [`HeartbeatConfig::validate`]; the parsed interval is recomputed on demand
/// so it always reflects the source string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Whether heartbeat monitoring is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Interval duration string, e.g. "30m" or "2h30m".
    #[serde(default = "default_every")]
    pub every: String,

    /// Optional custom heartbeat prompt.
    #[serde(default)]
    pub prompt: Option<String>,

    /// Delivery target: "last", "none", or a literal chat id.
    #[serde(default = "default_target")]
    pub target: String,

    /// Optional time window restriction, e.g. "09:00-17:00".
    #[serde(default)]
    pub active_hours: Option<String>,

    /// Acknowledgments whose content is at most this many characters are
    /// suppressed.
    #[serde(default = "default_ack_max_chars")]
    pub ack_max_chars: usize,

    /// IANA timezone the active-hours window is interpreted in.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Optional model override for heartbeat runs.
    #[serde(default)]
    pub model: Option<String>,
}

fn default_every() -> String {
    "30m".to_string()
}

fn default_target() -> String {
    "last".to_string()
}

fn default_ack_max_chars() -> usize {
    300
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            every: default_every(),
            prompt: None,
            target: default_target(),
            active_hours: None,
            ack_max_chars: default_ack_max_chars(),
            timezone: default_timezone(),
            model: None,
        }
    }
}

impl HeartbeatConfig {
    /// Validate all schedule strings and thresholds.
    ///
    /// Called at startup so format errors are fatal before any loop starts.
    pub fn validate(&self) -> Result<(), SettingsError> {
        parse_interval(Some(&self.every))?;

        if let Some(window) = &self.active_hours {
            if !window.trim().is_empty() {
                parse_active_hours(window)?;
            }
        }

        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ScheduleError::UnknownTimezone { name: self.timezone.clone() })?;

        if self.ack_max_chars == 0 {
            return Err(SettingsError::Invalid {
                field: "heartbeat.ack_max_chars",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// The parsed interval. Recomputed from `every` each call.
    pub fn interval(&self) -> Result<Duration, ScheduleError> {
        parse_interval(Some(&self.every))
    }
}
