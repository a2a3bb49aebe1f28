//! The reasoning-engine seam.
//!
//! The engine itself (model routing, tool execution, streaming transport) is
//! an external collaborator.  The hub only needs the five operations below
//! plus a typed event stream it can drain per turn.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::EngineError;
use crate::message::{MessageContent, Role};

/// Typed events emitted by the engine while a turn is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Incremental text as the engine streams its response.
    TextDelta(String),
    /// The engine finalized one structured message.
    MessageFinal {
        role: Role,
        content: MessageContent,
    },
    /// A tool invocation started.
    ToolStart {
        name: String,
        arguments: serde_json::Value,
    },
    /// A tool invocation finished.
    ToolEnd {
        name: String,
        result: String,
        is_error: bool,
    },
}

/// Operations the hub drives a turn with.
///
/// `subscribe` hands out a broadcast receiver; dropping the receiver
/// unsubscribes, so the per-turn draining loop cannot leak listeners on any
/// exit path, error included.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn set_system_prompt(&self, text: &str) -> Result<(), EngineError>;

    /// Replace the engine's working message list wholesale.  Called before
    /// each turn with the bounded recent-context window.
    async fn replace_messages(&self, messages: Vec<crate::StoredMessage>) -> Result<(), EngineError>;

    /// Start a turn.  Returns as soon as the turn is initiated; progress is
    /// observed through the event stream and [`ReasoningEngine::wait_for_idle`].
    async fn prompt(&self, input: &str) -> Result<(), EngineError>;

    /// Suspend until the turn, including any tool-execution rounds, has
    /// fully settled.
    async fn wait_for_idle(&self) -> Result<(), EngineError>;

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;

    /// One-shot, tool-free completion.  Used by memory compaction; never
    /// touches the working message list.
    async fn complete_oneshot(&self, prompt: &str) -> Result<String, EngineError>;
}

/// Builds a per-user engine instance (each user has their own persona and
/// configuration).  Called at most once per user by the hub.
pub trait EngineFactory: Send + Sync {
    fn create_for_user(&self, user_id: &str) -> Result<Arc<dyn ReasoningEngine>, EngineError>;
}
