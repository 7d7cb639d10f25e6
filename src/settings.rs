//! Configuration loaded from environment variables.
//!
//! All settings use the `COURIER_` prefix. A `.env` file in the working
//! directory is honored via dotenvy before the environment is read.

use std::collections::HashMap;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use crate::error::SettingsError;
use crate::heartbeat::HeartbeatConfig;

/// Runtime configuration for the gateway.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Telegram bot token.
    pub bot_token: SecretString,
    /// Telegram user ids allowed to talk to the bot. Empty denies everyone.
    pub allowed_user_ids: Vec<i64>,
    /// Workspace the agent operates in.
    pub workspace_dir: PathBuf,
    /// Memory directory, relative to the workspace.
    pub memory_dir: PathBuf,
    /// Bind host for the webhook server.
    pub host: String,
    /// Bind port for the webhook server.
    pub port: u16,
    /// URL path Telegram posts updates to.
    pub webhook_path: String,
    /// Path to the agent CLI binary.
    pub agent_binary: PathBuf,
    /// Optional model override for user conversations.
    pub agent_model: Option<String>,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Load settings from an explicit variable map.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, SettingsError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let workspace_dir = match get("COURIER_WORKSPACE") {
            Some(dir) => PathBuf::from(dir),
            None => default_workspace(),
        };

        let port = match get("COURIER_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| SettingsError::Invalid {
                field: "COURIER_PORT",
                reason: format!("not a valid port: {raw}"),
            })?,
            None => 8080,
        };

        let heartbeat = HeartbeatConfig {
            enabled: get("COURIER_HEARTBEAT_ENABLED")
                .map(|v| parse_bool(&v))
                .transpose()
                .map_err(|reason| SettingsError::Invalid {
                    field: "COURIER_HEARTBEAT_ENABLED",
                    reason,
                })?
                .unwrap_or(false),
            every: get("COURIER_HEARTBEAT_EVERY").unwrap_or_else(|| "30m".to_string()),
            prompt: get("COURIER_HEARTBEAT_PROMPT"),
            target: get("COURIER_HEARTBEAT_TARGET").unwrap_or_else(|| "last".to_string()),
            active_hours: get("COURIER_HEARTBEAT_ACTIVE_HOURS"),
            ack_max_chars: match get("COURIER_HEARTBEAT_ACK_MAX_CHARS") {
                Some(raw) => raw.parse::<usize>().map_err(|_| SettingsError::Invalid {
                    field: "COURIER_HEARTBEAT_ACK_MAX_CHARS",
                    reason: format!("not a number: {raw}"),
                })?,
                None => 300,
            },
            timezone: get("COURIER_HEARTBEAT_TIMEZONE").unwrap_or_else(|| "UTC".to_string()),
            model: get("COURIER_HEARTBEAT_MODEL"),
        };

        Ok(Self {
            bot_token: SecretString::from(get("COURIER_BOT_TOKEN").unwrap_or_default()),
            allowed_user_ids: parse_user_ids(get("COURIER_ALLOWED_USER_IDS").as_deref())?,
            workspace_dir,
            memory_dir: get("COURIER_MEMORY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("areas/courier")),
            host: get("COURIER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            webhook_path: get("COURIER_WEBHOOK_PATH").unwrap_or_else(|| "/webhook".to_string()),
            agent_binary: get("COURIER_AGENT_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("claude")),
            agent_model: get("COURIER_AGENT_MODEL"),
            heartbeat,
        })
    }

    /// Absolute path to the memory directory.
    pub fn memory_path(&self) -> PathBuf {
        self.workspace_dir.join(&self.memory_dir)
    }

    /// Where chat transcripts are written.
    pub fn history_path(&self) -> PathBuf {
        self.memory_path().join("chat-history")
    }

    /// The heartbeat checklist file in the workspace.
    pub fn checklist_path(&self) -> PathBuf {
        self.workspace_dir.join("HEARTBEAT.md")
    }

    /// Webhook server bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check that everything required to serve traffic is configured.
    /// Returns every problem found, not just the first.
    pub fn validate_ready(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bot_token.expose_secret().is_empty() {
            errors.push("COURIER_BOT_TOKEN is required".to_string());
        }
        if self.allowed_user_ids.is_empty() {
            errors.push(
                "COURIER_ALLOWED_USER_IDS is required (comma-separated user ids)".to_string(),
            );
        }
        if !self.workspace_dir.is_dir() {
            errors.push(format!(
                "COURIER_WORKSPACE does not exist: {}",
                self.workspace_dir.display()
            ));
        }
        if !self.agent_binary.is_file() {
            errors.push(format!(
                "COURIER_AGENT_BIN not found at: {}",
                self.agent_binary.display()
            ));
        }
        if let Err(e) = self.heartbeat.validate() {
            errors.push(format!("heartbeat configuration: {e}"));
        }

        errors
    }
}

fn default_workspace() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join("workspace")
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("not a boolean: {other}")),
    }
}

fn parse_user_ids(raw: Option<&str>) -> Result<Vec<i64>, SettingsError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>().map_err(|_| SettingsError::Invalid {
                field: "COURIER_ALLOWED_USER_IDS",
                reason: format!("not a user id: {part}"),
            })
        })
        .collect()
}
