//! The channel seam — the uniform surface every chat platform adapter
//! implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::session::SessionKey;

/// Sentinel target in a channel spec asking for a direct-message session.
pub const DM_TARGET: &str = "DM";

/// What the core needs from a chat platform.  Everything platform-specific
/// (attachments, typing indicators, edits) stays inside the adapter.
///
/// `create_dm_session` is a required capability of every channel rather than
/// something selected by inspecting the concrete adapter type.
#[async_trait]
pub trait Channel: Send + Sync {
    fn channel_type(&self) -> &str;

    /// Send `text` into the conversation named by `session`.  Returns the
    /// platform message id.
    async fn send_thread_reply(&self, session: &SessionKey, text: &str)
        -> Result<String, ChannelError>;

    /// Materialize a direct-message session with the given user.
    async fn create_dm_session(&self, user_id: &str) -> Result<SessionKey, ChannelError>;
}

/// A `channelType:target` pair as written in schedule definitions and event
/// files.  `target == "DM"` asks for a direct-message session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub channel_type: String,
    pub target: String,
}

impl ChannelSpec {
    /// Parse `"telegram:DM"` / `"slack:C123"`.  The target may itself
    /// contain colons; only the first one splits.
    pub fn parse(spec: &str) -> Option<Self> {
        let (channel_type, target) = spec.split_once(':')?;
        if channel_type.is_empty() || target.is_empty() {
            return None;
        }
        Some(Self {
            channel_type: channel_type.to_string(),
            target: target.to_string(),
        })
    }

    pub fn is_dm(&self) -> bool {
        self.target == DM_TARGET
    }

    /// Session key for a non-DM proactive target: the literal channel id
    /// with a synthesized `:proactive` conversation.
    pub fn proactive_session(&self) -> SessionKey {
        SessionKey::new(
            self.channel_type.clone(),
            format!("{}:proactive", self.target),
        )
    }
}
