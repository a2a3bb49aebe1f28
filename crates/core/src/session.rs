//! Session identity — the composite key naming one logical conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One logical conversation, keyed by channel kind, the channel's own
/// conversation id, and an optional thread id.
///
/// The derived [`SessionKey::session_id`] is globally unique and stable: the
/// same triple always yields the same id, and an id is never reused for a
/// different user's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub channel_type: String,
    pub conversation_id: String,
    pub thread_id: Option<String>,
}

impl SessionKey {
    pub fn new(
        channel_type: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            channel_type: channel_type.into(),
            conversation_id: conversation_id.into(),
            thread_id: None,
        }
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Deterministic globally-unique id for this conversation.
    ///
    /// Readable on purpose: the id doubles as the on-disk context-log name,
    /// so an operator can map a file straight back to the conversation.
    pub fn session_id(&self) -> String {
        match &self.thread_id {
            Some(thread) => format!(
                "{}:{}:{}",
                self.channel_type, self.conversation_id, thread
            ),
            None => format!("{}:{}", self.channel_type, self.conversation_id),
        }
    }
}

/// An inbound message as handed over by a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform-level id of the sending user.
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}
