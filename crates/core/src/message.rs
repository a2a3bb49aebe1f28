//! Stored messages — the unit of the append-only per-session context log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who (or what) produced a context-log entry.
///
/// `CompactionMarker` is synthetic: it never corresponds to a real turn and
/// exists only to mark the boundary up to which history has already been
/// summarized into long-term memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolResult,
    CompactionMarker,
}

/// One typed part of a structured message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        name: String,
        output: String,
        is_error: bool,
    },
}

/// Message payload: either plain text or a sequence of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flatten to plain text for prompt rendering.  Tool calls and results
    /// are summarized on one line each; text parts are joined with newlines.
    pub fn as_plain_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::ToolCall { name, .. } => {
                        format!("(tool call: {name})")
                    }
                    ContentPart::ToolResult { name, output, is_error } => {
                        if *is_error {
                            format!("(tool {name} failed: {output})")
                        } else {
                            format!("(tool {name}: {output})")
                        }
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

/// One entry of a session's context log.
///
/// Timestamps are monotonically non-decreasing within a session (entries are
/// only ever appended), but carry no cross-session ordering meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::now(Role::User, MessageContent::Text(text.into()))
    }

    pub fn assistant(content: MessageContent) -> Self {
        Self::now(Role::Assistant, content)
    }

    pub fn tool_result(name: impl Into<String>, output: impl Into<String>, is_error: bool) -> Self {
        Self::now(
            Role::ToolResult,
            MessageContent::Parts(vec![ContentPart::ToolResult {
                name: name.into(),
                output: output.into(),
                is_error,
            }]),
        )
    }

    /// Synthetic marker recording that `consumed` messages were summarized
    /// into long-term memory.  The most recent marker is the authoritative
    /// compaction boundary.
    pub fn compaction_marker(consumed: usize) -> Self {
        Self::now(
            Role::CompactionMarker,
            MessageContent::Text(format!("compacted {consumed} messages into long-term memory")),
        )
    }

    fn now(role: Role, content: MessageContent) -> Self {
        Self {
            role,
            content,
            timestamp: Utc::now(),
        }
    }
}
