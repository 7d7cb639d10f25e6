//! Delivery of heartbeat alerts to Telegram chats.
//!
//! Supports three target modes: `"last"` (most recently active chat),
//! `"none"` (delivery disabled), or a literal chat id.

use std::sync::Arc;
use std::sync::Mutex;

use crate::channels::formatter::format_for_telegram;
use crate::channels::TelegramChannel;
use crate::heartbeat::executor::HeartbeatResult;

/// Resolves heartbeat delivery targets and sends alerts.
pub struct HeartbeatDelivery {
    telegram: Arc<TelegramChannel>,
    target: String,
    last_active_chat: Mutex<Option<i64>>,
}

impl HeartbeatDelivery {
    pub fn new(telegram: Arc<TelegramChannel>, target: impl Into<String>) -> Self {
        Self {
            telegram,
            target: target.into(),
            last_active_chat: Mutex::new(None),
        }
    }

    /// Record activity from a chat so `"last"` targeting can follow the user.
    pub fn record_activity(&self, chat_id: i64) {
        if let Ok(mut last) = self.last_active_chat.lock() {
            *last = Some(chat_id);
        }
        tracing::debug!("Recorded activity for chat {}", chat_id);
    }

    /// The chat alerts should go to, or `None` when delivery is off or no
    /// target is known yet.
    pub fn target_chat(&self) -> Option<i64> {
        match self.target.as_str() {
            "none" => None,
            "last" => self.last_active_chat.lock().ok().and_then(|last| *last),
            literal => match literal.parse::<i64>() {
                Ok(chat_id) => Some(chat_id),
                Err(_) => {
                    tracing::warn!("Invalid heartbeat target chat id: {}", literal);
                    None
                }
            },
        }
    }

    /// Deliver a heartbeat alert to the configured target.
    ///
    /// Matches the alert-callback shape used by the scheduler. Send failures
    /// are logged, never propagated.
    pub async fn deliver(&self, result: &HeartbeatResult) {
        let Some(chat_id) = self.target_chat() else {
            tracing::debug!("No target chat for heartbeat delivery");
            return;
        };

        let message = format!("💓 **Heartbeat Alert**\n\n{}", result.content);
        let chunks = format_for_telegram(&message);

        match self.telegram.send_all(chat_id, &chunks).await {
            Ok(()) => tracing::info!("Delivered heartbeat alert to chat {}", chat_id),
            Err(e) => tracing::error!("Failed to deliver heartbeat alert: {}", e),
        }
    }
}
