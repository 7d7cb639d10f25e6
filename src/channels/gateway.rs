//! Webhook gateway for Telegram updates.
//!
//! Telegram retries updates that are not acknowledged quickly, so the webhook
//! handler records the update id, spawns the real work in the background, and
//! returns immediately. Duplicate update ids are dropped by a bounded
//! insertion-ordered cache.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::agent::{PartialCallback, SessionExecutor};
use crate::channels::formatter::{format_error, format_for_telegram};
use crate::channels::telegram::TelegramChannel;
use crate::heartbeat::HeartbeatDelivery;
use crate::history::ChatHistoryStore;
use crate::settings::Settings;

/// Maximum number of processed update ids remembered for deduplication.
const MAX_TRACKED_UPDATES: usize = 1000;

/// Telegram webhook update payload.
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub edited_message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

impl TelegramUser {
    fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("unknown")
    }
}

/// Bounded insertion-ordered set of processed update ids.
struct UpdateDedup {
    order: VecDeque<i64>,
    seen: HashSet<i64>,
}

impl UpdateDedup {
    fn new() -> Self {
        Self { order: VecDeque::new(), seen: HashSet::new() }
    }

    /// Mark an update as processed. Returns false when already seen.
    fn mark(&mut self, update_id: i64) -> bool {
        if !self.seen.insert(update_id) {
            return false;
        }
        self.order.push_back(update_id);
        while self.order.len() > MAX_TRACKED_UPDATES {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

/// Shared state behind the webhook routes.
pub struct GatewayContext {
    pub settings: Arc<Settings>,
    pub executor: Arc<SessionExecutor>,
    pub telegram: Arc<TelegramChannel>,
    pub history: Arc<ChatHistoryStore>,
    pub delivery: Arc<HeartbeatDelivery>,
    dedup: Mutex<UpdateDedup>,
}

impl GatewayContext {
    pub fn new(
        settings: Arc<Settings>,
        executor: Arc<SessionExecutor>,
        telegram: Arc<TelegramChannel>,
        history: Arc<ChatHistoryStore>,
        delivery: Arc<HeartbeatDelivery>,
    ) -> Self {
        Self {
            settings,
            executor,
            telegram,
            history,
            delivery,
            dedup: Mutex::new(UpdateDedup::new()),
        }
    }

    fn mark_processed(&self, update_id: i64) -> bool {
        self.dedup.lock().map(|mut dedup| dedup.mark(update_id)).unwrap_or(true)
    }

    fn is_user_allowed(&self, user_id: Option<i64>) -> bool {
        let Some(user_id) = user_id else {
            return false;
        };
        // Empty allowlist denies everyone rather than letting anyone in.
        self.settings.allowed_user_ids.contains(&user_id)
    }
}

/// Build the axum router serving the health check and the webhook.
pub fn router(context: Arc<GatewayContext>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(&context.settings.webhook_path, post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "courier"}))
}

/// Accept an update, kick off processing, and acknowledge immediately.
/// Always answers 200 so Telegram does not retry malformed payloads forever.
async fn webhook(
    State(context): State<Arc<GatewayContext>>,
    Json(payload): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    match serde_json::from_value::<TelegramUpdate>(payload) {
        Ok(update) => {
            tokio::spawn(handle_update(context, update));
            Json(serde_json::json!({"ok": true}))
        }
        Err(e) => {
            tracing::warn!("Ignoring malformed webhook payload: {}", e);
            Json(serde_json::json!({"ok": false, "error": e.to_string()}))
        }
    }
}

/// Process one Telegram update end to end.
pub async fn handle_update(context: Arc<GatewayContext>, update: TelegramUpdate) {
    if !context.mark_processed(update.update_id) {
        tracing::debug!("Update {} already processed, skipping", update.update_id);
        return;
    }

    let Some(message) = update.message.or(update.edited_message) else {
        tracing::debug!("Update {} has no message, ignoring", update.update_id);
        return;
    };

    let chat_id = message.chat.id;
    let text = match message.text.as_deref() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => {
            tracing::debug!("Update {} has no text, ignoring", update.update_id);
            return;
        }
    };

    let user_id = message.from.as_ref().map(|u| u.id);
    let display_name =
        message.from.as_ref().map(|u| u.display_name().to_string()).unwrap_or_default();

    if !context.is_user_allowed(user_id) {
        tracing::warn!("Unauthorized user {:?} ({}) attempted access", user_id, display_name);
        send_plain(&context, chat_id, "⛔ Unauthorized. This bot is private.").await;
        return;
    }

    if text.trim().eq_ignore_ascii_case("/reset") {
        tracing::info!("Reset command from {} for chat {}", display_name, chat_id);
        context.executor.reset(chat_id).await;
        send_plain(&context, chat_id, "🔄 Conversation reset. Starting fresh!").await;
        return;
    }

    tracing::info!("Processing message from {} ({:?}): {:.50}...", display_name, user_id, text);

    // From here on the chat is a live delivery target for heartbeat alerts.
    context.delivery.record_activity(chat_id);

    if let Err(e) = context.history.save_message(chat_id, "user", &text).await {
        tracing::warn!("Failed to save chat history: {}", e);
    }

    context.telegram.send_typing(chat_id).await;

    // Stream substantive intermediate output while the agent works.
    let on_partial: PartialCallback = {
        let telegram = context.telegram.clone();
        Arc::new(move |partial| {
            let telegram = telegram.clone();
            Box::pin(async move {
                for chunk in format_for_telegram(&partial) {
                    if let Err(e) = telegram.send_message(chat_id, &chunk).await {
                        tracing::warn!("Failed to send partial message: {}", e);
                    }
                }
            })
        })
    };

    let result = context.executor.execute(&text, chat_id, Some(on_partial)).await;

    if result.success {
        if let Err(e) = context.history.save_message(chat_id, "assistant", &result.output).await {
            tracing::warn!("Failed to save chat history: {}", e);
        }
        for chunk in format_for_telegram(&result.output) {
            if let Err(e) = context.telegram.send_message(chat_id, &chunk).await {
                tracing::error!("Failed to send response chunk: {}", e);
            }
        }
    } else {
        let error = format_error(result.error.as_deref().unwrap_or("Unknown error"));
        if let Err(e) = context.telegram.send_message(chat_id, &error).await {
            tracing::error!("Failed to send error message: {}", e);
        }
    }
}

async fn send_plain(context: &GatewayContext, chat_id: i64, text: &str) {
    let message =
        crate::channels::formatter::FormattedMessage { text: text.to_string(), parse_mode: None };
    if let Err(e) = context.telegram.send_message(chat_id, &message).await {
        tracing::error!("Failed to send message: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ExecutorOptions;
    use crate::agent::session::{AgentConnector, AgentSession, SessionOptions};
    use crate::error::AgentError;
    use async_trait::async_trait;
    use secrecy::SecretString;

    struct NullConnector;

    #[async_trait]
    impl AgentConnector for NullConnector {
        async fn connect(
            &self,
            _options: &SessionOptions,
        ) -> Result<Box<dyn AgentSession>, AgentError> {
            Err(AgentError::Session("not used in this test".to_string()))
        }
    }

    struct Fixture {
        context: Arc<GatewayContext>,
        _dir: tempfile::TempDir,
    }

    fn fixture(allowed: Vec<i64>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut vars = std::collections::HashMap::new();
        vars.insert("COURIER_WORKSPACE".to_string(), dir.path().display().to_string());
        let mut settings = Settings::from_map(&vars).unwrap();
        settings.allowed_user_ids = allowed;

        let executor = Arc::new(
            SessionExecutor::new(Arc::new(NullConnector), ExecutorOptions::new(dir.path()))
                .unwrap(),
        );
        let telegram = Arc::new(TelegramChannel::with_api_base(
            SecretString::from("token".to_string()),
            "http://127.0.0.1:9",
        ));
        let history = Arc::new(ChatHistoryStore::new(dir.path().join("history")));
        let delivery = Arc::new(HeartbeatDelivery::new(telegram.clone(), "last"));

        Fixture {
            context: Arc::new(GatewayContext::new(
                Arc::new(settings),
                executor,
                telegram,
                history,
                delivery,
            )),
            _dir: dir,
        }
    }

    #[test]
    fn dedup_drops_repeats_and_evicts_oldest() {
        let mut dedup = UpdateDedup::new();
        assert!(dedup.mark(1));
        assert!(!dedup.mark(1));

        for id in 2..=(MAX_TRACKED_UPDATES as i64 + 1) {
            assert!(dedup.mark(id));
        }
        // Update 1 has been evicted and counts as new again.
        assert!(dedup.mark(1));
    }

    #[test]
    fn allowlist_is_fail_secure() {
        let f = fixture(vec![]);
        assert!(!f.context.is_user_allowed(Some(123)));
        assert!(!f.context.is_user_allowed(None));

        let f = fixture(vec![123]);
        assert!(f.context.is_user_allowed(Some(123)));
        assert!(!f.context.is_user_allowed(Some(456)));
    }

    #[test]
    fn parses_update_payload() {
        let payload = serde_json::json!({
            "update_id": 99,
            "message": {
                "message_id": 5,
                "from": {"id": 123, "first_name": "Ada", "is_bot": false},
                "chat": {"id": -456, "type": "private"},
                "text": "hello",
            },
        });
        let update: TelegramUpdate = serde_json::from_value(payload).unwrap();
        assert_eq!(update.update_id, 99);
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, -456);
        assert_eq!(message.from.unwrap().display_name(), "Ada");
        assert_eq!(message.text.as_deref(), Some("hello"));
    }

    #[test]
    fn update_without_message_is_parseable() {
        let update: TelegramUpdate = serde_json::from_value(serde_json::json!({
            "update_id": 1,
        }))
        .unwrap();
        assert!(update.message.is_none());
        assert!(update.edited_message.is_none());
    }

    #[tokio::test]
    async fn duplicate_update_is_ignored() {
        let f = fixture(vec![123]);
        assert!(f.context.mark_processed(7));
        assert!(!f.context.mark_processed(7));
    }

    #[tokio::test]
    async fn update_without_text_records_nothing() {
        let f = fixture(vec![123]);
        let update: TelegramUpdate = serde_json::from_value(serde_json::json!({
            "update_id": 3,
            "message": {"chat": {"id": 5}, "from": {"id": 123}},
        }))
        .unwrap();
        handle_update(f.context.clone(), update).await;
        // No activity recorded: the heartbeat still has no delivery target.
        assert_eq!(f.context.delivery.target_chat(), None);
    }
}
