//! Session executor: the bridge between conversations and agent sessions.
//!
//! Each conversation (chat id) owns at most one live agent session. Calls
//! against the same conversation are serialized by a per-chat lock held for
//! the entire exchange; different conversations proceed fully concurrently.
//!
//! Draining the agent's response stream uses a two-state idle timeout: long
//! before the first terminal result (tool use can be slow), short afterwards
//! (a follow-up phase either reports back promptly or not at all). A run that
//! spawns sub-agents can produce several terminal results; the last one wins.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::agent::session::{AgentConnector, AgentEvent, AgentSession, ContentPart, SessionOptions};
use crate::error::{AgentError, SettingsError};

/// Callback receiving substantive intermediate text while a run is in flight.
pub type PartialCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Idle timeout before the first terminal result arrives.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Idle timeout once at least one terminal result has been seen.
const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum combined length of an assistant message before it is streamed to
/// the partial-text callback. Shorter fragments are status noise.
const DEFAULT_PARTIAL_MIN_CHARS: usize = 100;

/// Normalized outcome of one `execute` call.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the exchange completed.
    pub success: bool,
    /// Final output text (empty on failure).
    pub output: String,
    /// Human-readable failure description.
    pub error: Option<String>,
}

impl ExecutionResult {
    fn ok(output: String) -> Self {
        Self { success: true, output, error: None }
    }

    fn failed(error: String) -> Self {
        Self { success: false, output: String::new(), error: Some(error) }
    }
}

/// Options governing session construction and stream draining.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Working directory for agent sessions. Must exist.
    pub working_dir: PathBuf,
    /// Optional model override applied to every session.
    pub model: Option<String>,
    /// Optional memory-priming text appended to the agent's system context.
    pub memory_prompt: Option<String>,
    /// Idle timeout while waiting for the first terminal result.
    pub idle_timeout: Duration,
    /// Idle timeout once a terminal result has been seen.
    pub settle_timeout: Duration,
    /// Minimum substance threshold for partial-text forwarding.
    pub partial_min_chars: usize,
}

impl ExecutorOptions {
    /// Options with default timeouts for the given working directory.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            model: None,
            memory_prompt: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
            partial_min_chars: DEFAULT_PARTIAL_MIN_CHARS,
        }
    }
}

type SessionHandle = Arc<Mutex<Box<dyn AgentSession>>>;

/// Why an exchange failed. Converted to the user-visible error string.
enum ExchangeError {
    /// Idle timeout elapsed before any terminal result arrived.
    Hang { idle: Duration },
    /// The session failed while connecting, sending, or draining.
    Agent(AgentError),
}

impl ExchangeError {
    fn describe(&self) -> String {
        match self {
            Self::Hang { idle } => format!(
                "Timed out after {}s waiting for the agent to produce a result",
                idle.as_secs()
            ),
            Self::Agent(e) => format!("Agent execution failed: {e}"),
        }
    }
}

/// Maps conversations to persistent agent sessions and executes prompts
/// against them.
pub struct SessionExecutor {
    connector: Arc<dyn AgentConnector>,
    options: ExecutorOptions,
    /// Live sessions by chat id. The table lock guards only insert/remove;
    /// the per-chat lock guards the full exchange.
    sessions: Mutex<HashMap<i64, SessionHandle>>,
    /// One lock per chat id, created lazily, never removed.
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SessionExecutor {
    /// Create an executor. Fails fast when the working directory is missing.
    pub fn new(
        connector: Arc<dyn AgentConnector>,
        options: ExecutorOptions,
    ) -> Result<Self, SettingsError> {
        if !options.working_dir.is_dir() {
            return Err(SettingsError::MissingWorkspace(options.working_dir.clone()));
        }
        Ok(Self {
            connector,
            options,
            sessions: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Execute a prompt in the context of one conversation.
    ///
    /// Serialized per chat id: two concurrent calls against the same
    /// conversation never interleave on the shared response stream. Never
    /// returns an error across this boundary; failures are reported in the
    /// result.
    pub async fn execute(
        &self,
        prompt: &str,
        chat_id: i64,
        on_partial: Option<PartialCallback>,
    ) -> ExecutionResult {
        let lock = self.chat_lock(chat_id).await;
        let _guard = lock.lock().await;

        match self.run_exchange(prompt, chat_id, on_partial).await {
            Ok(output) => ExecutionResult::ok(output),
            Err(failure) => {
                // The session is in an indeterminate state; discard it so the
                // next call starts fresh.
                self.teardown(chat_id).await;
                let description = failure.describe();
                tracing::error!("Execution failed for chat {}: {}", chat_id, description);
                ExecutionResult::failed(description)
            }
        }
    }

    /// Discard the session for a conversation, if any.
    pub async fn reset(&self, chat_id: i64) {
        let lock = self.chat_lock(chat_id).await;
        let _guard = lock.lock().await;
        self.teardown(chat_id).await;
    }

    /// Tear down every session. Best-effort: disconnect failures are logged
    /// and the table is cleared regardless.
    pub async fn shutdown(&self) {
        let handles: Vec<(i64, SessionHandle)> = self.sessions.lock().await.drain().collect();
        for (chat_id, handle) in handles {
            let mut session = handle.lock().await;
            if let Err(e) = session.disconnect().await {
                tracing::warn!("Error disconnecting session for chat {}: {}", chat_id, e);
            }
        }
        tracing::info!("All agent sessions shut down");
    }

    /// Whether a conversation currently has a live session.
    pub async fn has_session(&self, chat_id: i64) -> bool {
        self.sessions.lock().await.contains_key(&chat_id)
    }

    async fn chat_lock(&self, chat_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The full exchange: connect if needed, send, drain. Caller holds the
    /// per-chat lock.
    async fn run_exchange(
        &self,
        prompt: &str,
        chat_id: i64,
        on_partial: Option<PartialCallback>,
    ) -> Result<String, ExchangeError> {
        let handle = self.session_handle(chat_id).await.map_err(ExchangeError::Agent)?;
        let mut session = handle.lock().await;

        session.send(prompt).await.map_err(ExchangeError::Agent)?;
        self.drain(&mut **session, chat_id, on_partial).await
    }

    /// Get the existing session for a chat or connect a new one.
    async fn session_handle(&self, chat_id: i64) -> Result<SessionHandle, AgentError> {
        if let Some(handle) = self.sessions.lock().await.get(&chat_id) {
            return Ok(handle.clone());
        }

        let options = SessionOptions {
            working_dir: self.options.working_dir.clone(),
            model: self.options.model.clone(),
            extra_system_prompt: self.options.memory_prompt.clone(),
        };
        tracing::info!("Connecting agent session for chat {}", chat_id);
        let session = self.connector.connect(&options).await?;

        let handle: SessionHandle = Arc::new(Mutex::new(session));
        self.sessions.lock().await.insert(chat_id, handle.clone());
        Ok(handle)
    }

    /// Drain the response stream until it ends or goes quiet.
    async fn drain(
        &self,
        session: &mut dyn AgentSession,
        chat_id: i64,
        on_partial: Option<PartialCallback>,
    ) -> Result<String, ExchangeError> {
        let mut fragments: Vec<String> = Vec::new();
        let mut last_result: Option<String> = None;
        let mut results_seen: u32 = 0;

        loop {
            // Tolerant while the agent is still working, strict once a result
            // has landed and only a possible follow-up phase remains.
            let idle = if results_seen == 0 {
                self.options.idle_timeout
            } else {
                self.options.settle_timeout
            };

            let event = match timeout(idle, session.next_event()).await {
                Err(_) if results_seen > 0 => {
                    tracing::debug!(
                        "Chat {} quiet for {:?} after {} result(s); run complete",
                        chat_id,
                        idle,
                        results_seen
                    );
                    break;
                }
                Err(_) => return Err(ExchangeError::Hang { idle }),
                Ok(Err(e)) => return Err(ExchangeError::Agent(e)),
                Ok(Ok(None)) => break,
                Ok(Ok(Some(event))) => event,
            };

            match event {
                AgentEvent::Assistant(parts) => {
                    let mut combined = String::new();
                    for part in parts {
                        match part {
                            ContentPart::Text(text) => {
                                combined.push_str(&text);
                                fragments.push(text);
                            }
                            ContentPart::ToolUse { name } => {
                                tracing::debug!("Chat {} agent invoked tool {}", chat_id, name);
                            }
                        }
                    }
                    if let Some(on_partial) = &on_partial {
                        if combined.chars().count() > self.options.partial_min_chars {
                            on_partial(combined).await;
                        }
                    }
                }
                AgentEvent::Result(info) => {
                    results_seen += 1;
                    tracing::info!(
                        "Chat {} result #{} (turns={:?}, duration_ms={:?}, cost_usd={:?})",
                        chat_id,
                        results_seen,
                        info.num_turns,
                        info.duration_ms,
                        info.cost_usd
                    );
                    if let Some(text) = info.text {
                        last_result = Some(text);
                    }
                }
                AgentEvent::System { subtype } => {
                    tracing::debug!("Chat {} system signal: {}", chat_id, subtype);
                }
            }
        }

        let output = match last_result {
            Some(text) => text,
            None => fragments.join("\n"),
        };
        Ok(output.trim().to_string())
    }

    /// Remove and disconnect the session for a chat. Disconnect failures are
    /// swallowed so teardown always completes.
    async fn teardown(&self, chat_id: i64) {
        let handle = self.sessions.lock().await.remove(&chat_id);
        if let Some(handle) = handle {
            let mut session = handle.lock().await;
            if let Err(e) = session.disconnect().await {
                tracing::warn!("Error disconnecting session for chat {}: {}", chat_id, e);
            }
            tracing::info!("Discarded agent session for chat {}", chat_id);
        }
    }
}
