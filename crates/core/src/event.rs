//! File-dropped trigger events consumed by the watcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a dropped event wants to be fired.
///
/// `Periodic` is parsed but never acted on by the watcher — recurring
/// triggers belong exclusively to the cron-based heartbeat schedules, so
/// there is exactly one source of truth for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Immediate,
    OneShot,
    Periodic,
}

/// One trigger file.  Created externally, consumed (fired then deleted) by
/// the watcher once its condition is met; never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub prompt: String,
    /// `channelType:target` spec, resolved the same way as a heartbeat
    /// schedule's channel.
    pub channel: String,
    /// Required for `one-shot`; ignored otherwise.
    #[serde(default)]
    pub trigger_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
