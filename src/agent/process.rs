//! Process-based agent session transport.
//!
//! Spawns the agent CLI as a long-lived child process speaking
//! newline-delimited JSON on stdin/stdout (`--input-format stream-json
//! --output-format stream-json`) and maps its events onto [`AgentEvent`]s.
//! Non-JSON lines and unknown event types are skipped, not errors.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::agent::session::{AgentConnector, AgentEvent, AgentSession, ContentPart, ResultInfo, SessionOptions};
use crate::error::{AgentError, SettingsError};

/// Connects agent sessions by spawning the agent CLI.
pub struct ProcessAgentConnector {
    binary: PathBuf,
}

impl ProcessAgentConnector {
    /// Create a connector. Fails fast when the binary is missing.
    pub fn new(binary: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let binary = binary.into();
        if !binary.is_file() {
            return Err(SettingsError::MissingAgentBinary(binary));
        }
        Ok(Self { binary })
    }
}

#[async_trait]
impl AgentConnector for ProcessAgentConnector {
    async fn connect(&self, options: &SessionOptions) -> Result<Box<dyn AgentSession>, AgentError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("--input-format")
            .arg("stream-json")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--dangerously-skip-permissions")
            .current_dir(&options.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(model) = &options.model {
            command.arg("--model").arg(model);
        }
        if let Some(extra) = &options.extra_system_prompt {
            command.arg("--append-system-prompt").arg(extra);
        }

        let mut child = command.spawn().map_err(|source| AgentError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(AgentError::MissingPipes)?;
        let stdout = child.stdout.take().ok_or(AgentError::MissingPipes)?;

        // Forward agent stderr into our logs instead of the terminal.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("agent stderr: {}", line);
                }
            });
        }

        Ok(Box::new(ProcessAgentSession {
            child,
            stdin: Some(stdin),
            lines: BufReader::new(stdout).lines(),
        }))
    }
}

/// A live agent child process.
struct ProcessAgentSession {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
}

impl ProcessAgentSession {
    /// Map one stream-json line onto an event. `None` for lines we skip.
    fn parse_line(line: &str) -> Option<AgentEvent> {
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) => {
                tracing::debug!("Skipping non-JSON agent output: {:.100}", line);
                return None;
            }
        };

        match value.get("type").and_then(|t| t.as_str()) {
            Some("assistant") => {
                let blocks = value
                    .pointer("/message/content")
                    .and_then(|c| c.as_array())
                    .cloned()
                    .unwrap_or_default();
                let parts: Vec<ContentPart> = blocks
                    .iter()
                    .filter_map(|block| match block.get("type").and_then(|t| t.as_str()) {
                        Some("text") => block
                            .get("text")
                            .and_then(|t| t.as_str())
                            .map(|t| ContentPart::Text(t.to_string())),
                        Some("tool_use") => Some(ContentPart::ToolUse {
                            name: block
                                .get("name")
                                .and_then(|n| n.as_str())
                                .unwrap_or("unknown")
                                .to_string(),
                        }),
                        _ => None,
                    })
                    .collect();
                Some(AgentEvent::Assistant(parts))
            }
            Some("result") => Some(AgentEvent::Result(ResultInfo {
                text: value.get("result").and_then(|r| r.as_str()).map(String::from),
                num_turns: value.get("num_turns").and_then(|n| n.as_u64()),
                duration_ms: value.get("duration_ms").and_then(|d| d.as_u64()),
                cost_usd: value.get("total_cost_usd").and_then(|c| c.as_f64()),
            })),
            Some("system") => Some(AgentEvent::System {
                subtype: value
                    .get("subtype")
                    .and_then(|s| s.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl AgentSession for ProcessAgentSession {
    async fn send(&mut self, prompt: &str) -> Result<(), AgentError> {
        let stdin = self.stdin.as_mut().ok_or(AgentError::MissingPipes)?;
        let message = serde_json::json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{"type": "text", "text": prompt}],
            },
        });
        let mut line = message.to_string();
        line.push('\n');
        stdin.write_all(line.as_bytes()).await.map_err(AgentError::Send)?;
        stdin.flush().await.map_err(AgentError::Send)
    }

    async fn next_event(&mut self) -> Result<Option<AgentEvent>, AgentError> {
        loop {
            let line = self.lines.next_line().await.map_err(AgentError::Stream)?;
            match line {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    if let Some(event) = Self::parse_line(&line) {
                        return Ok(Some(event));
                    }
                }
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), AgentError> {
        // Closing stdin asks the agent to exit; the kill is the backstop.
        self.stdin.take();
        if let Err(e) = self.child.start_kill() {
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(AgentError::Session(format!("failed to stop agent process: {e}")));
            }
        }
        let _ = self.child.wait().await;
        Ok(())
    }
}
