//! Telegram Bot API client for outbound messages.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::channels::formatter::FormattedMessage;
use crate::error::ChannelError;

const API_BASE: &str = "https://api.telegram.org";

/// Subset of the Bot API response envelope we care about.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Sends messages and chat actions through the Telegram Bot API.
pub struct TelegramChannel {
    client: reqwest::Client,
    token: SecretString,
    api_base: String,
}

impl TelegramChannel {
    pub fn new(token: SecretString) -> Self {
        Self::with_api_base(token, API_BASE)
    }

    /// Point the channel at a different API host. Used by tests.
    pub fn with_api_base(token: SecretString, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            token,
            api_base: api_base.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token.expose_secret(), method)
    }

    /// Send one formatted message chunk.
    ///
    /// When Telegram rejects the MarkdownV2 entities, retries once without a
    /// parse mode so the user still gets the raw text.
    pub async fn send_message(
        &self,
        chat_id: i64,
        message: &FormattedMessage,
    ) -> Result<(), ChannelError> {
        let mut parse_mode = message.parse_mode;

        loop {
            let mut payload = serde_json::json!({
                "chat_id": chat_id,
                "text": message.text,
            });
            if let Some(mode) = parse_mode {
                payload["parse_mode"] = serde_json::Value::String(mode.to_string());
            }

            let response = self
                .client
                .post(self.method_url("sendMessage"))
                .json(&payload)
                .send()
                .await?;

            let body: ApiResponse = response.json().await?;
            if body.ok {
                return Ok(());
            }

            let description = body.description.unwrap_or_else(|| "unknown error".to_string());
            if parse_mode.is_some() && description.to_lowercase().contains("can't parse") {
                tracing::info!("Telegram rejected markdown, retrying as plain text");
                parse_mode = None;
                continue;
            }
            return Err(ChannelError::Api { description });
        }
    }

    /// Send every chunk of a multi-part response in order.
    pub async fn send_all(
        &self,
        chat_id: i64,
        messages: &[FormattedMessage],
    ) -> Result<(), ChannelError> {
        for message in messages {
            self.send_message(chat_id, message).await?;
        }
        Ok(())
    }

    /// Show the "typing…" indicator. Best-effort.
    pub async fn send_typing(&self, chat_id: i64) {
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "action": "typing",
        });
        let request = self
            .client
            .post(self.method_url("sendChatAction"))
            .json(&payload)
            .send()
            .await;
        if let Err(e) = request {
            tracing::debug!("Failed to send typing indicator: {}", e);
        }
    }
}
