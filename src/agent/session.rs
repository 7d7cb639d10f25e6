//! Agent session abstraction.
//!
//! The executor treats the underlying agent runtime as an opaque session:
//! connect once, send prompts, drain a stream of typed events, disconnect.
//! The concrete transport lives in [`crate::agent::process`]; tests supply
//! scripted fakes.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::AgentError;

/// Options used when establishing a new agent session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Working directory the agent operates in.
    pub working_dir: PathBuf,
    /// Optional model override.
    pub model: Option<String>,
    /// Extra system context appended to the agent's system prompt, typically
    /// assembled from memory files.
    pub extra_system_prompt: Option<String>,
}

/// One content block of an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    /// A text fragment.
    Text(String),
    /// A tool invocation signal; never forwarded to users as text.
    ToolUse { name: String },
}

/// Metadata carried by a terminal result event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultInfo {
    /// Authoritative answer text for this phase, when present.
    pub text: Option<String>,
    /// Number of agent turns taken.
    pub num_turns: Option<u64>,
    /// Wall-clock duration of the phase in milliseconds.
    pub duration_ms: Option<u64>,
    /// Cost of the phase in USD.
    pub cost_usd: Option<f64>,
}

/// A typed event received from an agent session stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// One assistant message, as a sequence of content parts.
    Assistant(Vec<ContentPart>),
    /// A terminal result marking the end of one agent turn or phase. A run
    /// that spawns sub-agents may produce several of these.
    Result(ResultInfo),
    /// A system/informational signal.
    System { subtype: String },
}

/// A live, connected agent session.
#[async_trait]
pub trait AgentSession: Send {
    /// Send a prompt on the session.
    async fn send(&mut self, prompt: &str) -> Result<(), AgentError>;

    /// Receive the next event from the session stream.
    ///
    /// Returns `Ok(None)` on clean end of stream.
    async fn next_event(&mut self) -> Result<Option<AgentEvent>, AgentError>;

    /// Tear down the session. Must be safe to call once after any failure.
    async fn disconnect(&mut self) -> Result<(), AgentError>;
}

/// Factory for agent sessions.
#[async_trait]
pub trait AgentConnector: Send + Sync {
    /// Establish a new session with the given options.
    async fn connect(&self, options: &SessionOptions) -> Result<Box<dyn AgentSession>, AgentError>;
}
