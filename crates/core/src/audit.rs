//! Audit records — one entry per observed event, written once, never read
//! back by the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    MsgIn,
    MsgOut,
    Message,
    ToolStart,
    ToolEnd,
    ProactiveTrigger,
    ProactiveSilent,
    Error,
}

/// One append-only audit entry.  `detail` is kind-specific and free-form;
/// the audit log exists for operator inspection, not for machine replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub kind: AuditKind,
    pub detail: serde_json::Value,
}

impl AuditRecord {
    pub fn new(session_id: impl Into<String>, kind: AuditKind, detail: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
            kind,
            detail,
        }
    }
}
