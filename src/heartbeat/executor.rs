//! Heartbeat execution: prompt assembly and response classification.

use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::SessionExecutor;
use crate::heartbeat::classifier::{OK_MARKER, classify_response};
use crate::heartbeat::config::HeartbeatConfig;
use crate::heartbeat::reader::read_checklist;

/// Reserved chat id for heartbeat conversations. Negative so it can never
/// collide with a real Telegram chat targeted by this gateway.
pub const HEARTBEAT_CHAT_ID: i64 = -999_999;

/// Default prompt when no custom prompt is configured.
const DEFAULT_PROMPT: &str = "You are performing a periodic health check.\n\
Review the current state and any items needing attention.\n\
\n\
If everything is OK and no alerts are needed, start with HEARTBEAT_OK.\n\
\n\
If there are issues requiring attention, describe them clearly.";

/// Result of one heartbeat execution.
///
/// `success` means the execution completed, even when the response reports
/// issues; `is_ok` and `should_deliver` come from the classifier.
#[derive(Debug, Clone)]
pub struct HeartbeatResult {
    pub success: bool,
    /// Response content with the acknowledgment marker stripped.
    pub content: String,
    pub should_deliver: bool,
    pub is_ok: bool,
    pub error: Option<String>,
}

impl HeartbeatResult {
    fn failed(error: String) -> Self {
        Self {
            success: false,
            content: String::new(),
            should_deliver: false,
            is_ok: false,
            error: Some(error),
        }
    }
}

/// Runs heartbeat prompts through the session executor and classifies the
/// responses.
pub struct HeartbeatExecutor {
    config: HeartbeatConfig,
    executor: Arc<SessionExecutor>,
    checklist_path: Option<PathBuf>,
}

impl HeartbeatExecutor {
    pub fn new(
        config: HeartbeatConfig,
        executor: Arc<SessionExecutor>,
        checklist_path: Option<PathBuf>,
    ) -> Self {
        Self { config, executor, checklist_path }
    }

    /// Build the heartbeat prompt: custom or default text, the checklist when
    /// it has meaningful content, and the marker instructions when absent.
    async fn build_prompt(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        match &self.config.prompt {
            Some(prompt) => parts.push(prompt.clone()),
            None => parts.push(DEFAULT_PROMPT.to_string()),
        }

        if let Some(path) = &self.checklist_path {
            if let Some(checklist) = read_checklist(path).await {
                parts.push("\n## Heartbeat Checklist\n".to_string());
                parts.push(checklist);
            }
        }

        let prompt = parts.join("\n");
        if prompt.contains(OK_MARKER) {
            prompt
        } else {
            parts.push(format!(
                "\n\nIf all checks pass, respond with {OK_MARKER}. \
                 Otherwise, describe any issues without the {OK_MARKER} marker."
            ));
            parts.join("\n")
        }
    }

    /// Execute one heartbeat check.
    ///
    /// Runs in the given conversation when supplied, otherwise in the
    /// reserved heartbeat conversation so the check stays isolated from user
    /// traffic.
    pub async fn run(&self, chat_id: Option<i64>) -> HeartbeatResult {
        let target = chat_id.unwrap_or(HEARTBEAT_CHAT_ID);
        let prompt = self.build_prompt().await;
        tracing::info!("Executing heartbeat ({} chars, chat_id={})", prompt.len(), target);

        let result = self.executor.execute(&prompt, target, None).await;

        if !result.success {
            return HeartbeatResult::failed(
                result.error.unwrap_or_else(|| "Unknown error".to_string()),
            );
        }

        let outcome = classify_response(&result.output, self.config.ack_max_chars);
        HeartbeatResult {
            success: true,
            content: outcome.content,
            should_deliver: outcome.should_deliver,
            is_ok: outcome.is_ok,
            error: None,
        }
    }
}
