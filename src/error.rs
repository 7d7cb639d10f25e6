//! Error types for courier subsystems.

use std::path::PathBuf;

/// Error parsing heartbeat schedule strings (intervals, active hours, timezones).
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid schedule format: '{input}' (expected something like \"30m\", \"2h30m\", or \"09:00-17:00\")")]
    InvalidFormat { input: String },

    #[error("schedule values must be positive: '{input}'")]
    NonPositive { input: String },

    #[error("unknown timezone: '{name}'")]
    UnknownTimezone { name: String },
}

/// Error talking to the agent process.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("failed to launch agent process '{binary}': {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("agent process has no stdio pipes")]
    MissingPipes,

    #[error("failed to send prompt to agent: {0}")]
    Send(#[source] std::io::Error),

    #[error("failed to read agent stream: {0}")]
    Stream(#[source] std::io::Error),

    #[error("agent session error: {0}")]
    Session(String),
}

/// Error during channel operations (Telegram API, webhook server).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("telegram api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("telegram api rejected request: {description}")]
    Api { description: String },
}

/// Error constructing or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("working directory does not exist: {0}")]
    MissingWorkspace(PathBuf),

    #[error("agent binary not found at: {0}")]
    MissingAgentBinary(PathBuf),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}
