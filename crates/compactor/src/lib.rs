//! Memory compaction — folds stale short-term context into the long-term
//! memory document without ever deleting the raw log.
//!
//! Runs after a completed turn.  When enough uncompacted messages have
//! accumulated, a tool-free one-shot reasoning call extracts durable facts
//! from the stale span; the facts are appended as a dated section to the
//! memory document and a compaction-marker entry is appended to the context
//! log as the new boundary.  The whole pass is best-effort: every failure is
//! logged and swallowed, and the triggering turn is never affected.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use switchboard_config::CompactionConfig;
use switchboard_core::{ReasoningEngine, Role, StoredMessage};
use switchboard_store::{MemoryDoc, SessionStore};

/// Reply sentinel meaning the span contained nothing worth remembering.
/// Requested verbatim in the extraction prompt.
pub const NOTHING_NEW: &str = "NO_NEW_FACTS";

/// What a compaction pass did.  Surfaced for tests and debug logging; the
/// hub ignores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Not enough uncompacted messages yet.
    BelowThreshold { uncompacted: usize },
    /// The engine reported the sentinel; nothing was written.
    NothingNew,
    /// A dated section was appended and a marker written.
    Compacted { consumed: usize },
    /// Something failed; already logged.  The turn that triggered the pass
    /// is unaffected.
    Failed,
}

#[derive(Debug, Clone)]
pub struct Compactor {
    threshold: usize,
    keep_recent: usize,
}

impl Compactor {
    pub fn new(config: &CompactionConfig) -> Self {
        Self {
            threshold: config.threshold,
            keep_recent: config.keep_recent,
        }
    }

    /// Run one compaction pass if the session is due.  Never returns an
    /// error: failures are logged and reported as [`CompactionOutcome::Failed`].
    pub async fn run_if_due(
        &self,
        session_id: &str,
        store: &SessionStore,
        memory: &MemoryDoc,
        engine: &dyn ReasoningEngine,
    ) -> CompactionOutcome {
        match self.run_inner(session_id, store, memory, engine).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(session = %session_id, error = %err, "compaction pass failed");
                CompactionOutcome::Failed
            }
        }
    }

    async fn run_inner(
        &self,
        session_id: &str,
        store: &SessionStore,
        memory: &MemoryDoc,
        engine: &dyn ReasoningEngine,
    ) -> Result<CompactionOutcome> {
        let messages = store.load_context(session_id).context("load context")?;
        let boundary = last_marker_boundary(&messages);
        let uncompacted = messages.len() - boundary;

        if uncompacted < self.threshold {
            debug!(
                session = %session_id,
                uncompacted,
                threshold = self.threshold,
                "compaction not due"
            );
            return Ok(CompactionOutcome::BelowThreshold { uncompacted });
        }

        // The most recent turns stay hot — visible directly, not only as a
        // summary.  Clamped to the boundary: keep_recent may exceed what
        // sits after the marker.
        let span_end = messages
            .len()
            .saturating_sub(self.keep_recent)
            .max(boundary);
        let span = &messages[boundary..span_end];
        if span.is_empty() {
            return Ok(CompactionOutcome::BelowThreshold { uncompacted });
        }

        let existing = memory.load().context("load memory document")?;
        let prompt = extraction_prompt(&existing, span);
        let reply = engine
            .complete_oneshot(&prompt)
            .await
            .context("fact-extraction call")?;

        if reply.trim() == NOTHING_NEW {
            info!(session = %session_id, span = span.len(), "compaction: nothing new");
            return Ok(CompactionOutcome::NothingNew);
        }

        let section = extract_facts(&reply);
        memory
            .append_section(&section)
            .await
            .context("append memory section")?;
        store
            .append_context(session_id, &StoredMessage::compaction_marker(span.len()))
            .await
            .context("append compaction marker")?;

        info!(
            session = %session_id,
            consumed = span.len(),
            "compaction: appended memory section and marker"
        );
        Ok(CompactionOutcome::Compacted { consumed: span.len() })
    }
}

/// Index of the first message after the most recent compaction marker, or 0
/// when the session has never been compacted.  Only messages strictly after
/// the marker are ever considered again.
fn last_marker_boundary(messages: &[StoredMessage]) -> usize {
    messages
        .iter()
        .rposition(|m| m.role == Role::CompactionMarker)
        .map(|idx| idx + 1)
        .unwrap_or(0)
}

fn extraction_prompt(existing_memory: &str, span: &[StoredMessage]) -> String {
    let rendered = span
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::ToolResult => "tool_result",
                Role::CompactionMarker => "marker",
            };
            format!("[{role}]: {}", m.content.as_plain_text())
        })
        .collect::<Vec<_>>()
        .join("\n");

    let memory_block = if existing_memory.trim().is_empty() {
        "(no long-term memory yet)".to_string()
    } else {
        existing_memory.trim().to_string()
    };

    format!(
        "You maintain a long-term memory document for one user. Review the \
conversation excerpt below and extract durable facts worth remembering across \
conversations: preferences, commitments, people, projects, dates. Ignore \
small talk and anything already present in the existing memory.\n\
Answer with one fact per line, each starting with \"- \".\n\
If there is nothing new to record, answer exactly {NOTHING_NEW}.\n\n\
EXISTING MEMORY:\n{memory_block}\n\nCONVERSATION EXCERPT:\n{rendered}"
    )
}

/// Pull `- ` bullet lines out of the reply.  When the model answered in
/// prose instead, fall back to a single low-confidence catch-all line —
/// losing an imperfect summary is worse than storing one.
fn extract_facts(reply: &str) -> String {
    let bullets: Vec<&str> = reply
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("- ") || line.starts_with("* "))
        .collect();

    if bullets.is_empty() {
        return format!("- (low confidence) {}", reply.trim().replace('\n', " "));
    }

    bullets
        .iter()
        .map(|line| format!("- {}", line[2..].trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    use switchboard_core::{EngineError, EngineEvent, MessageContent};
    use switchboard_store::UserPaths;

    use super::*;

    struct CannedEngine {
        reply: String,
        calls: Arc<AtomicUsize>,
    }

    impl CannedEngine {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ReasoningEngine for CannedEngine {
        async fn set_system_prompt(&self, _text: &str) -> Result<(), EngineError> {
            Ok(())
        }
        async fn replace_messages(&self, _messages: Vec<StoredMessage>) -> Result<(), EngineError> {
            Ok(())
        }
        async fn prompt(&self, _input: &str) -> Result<(), EngineError> {
            Ok(())
        }
        async fn wait_for_idle(&self) -> Result<(), EngineError> {
            Ok(())
        }
        fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
            broadcast::channel(1).1
        }
        async fn complete_oneshot(&self, _prompt: &str) -> Result<String, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn fixtures(dir: &TempDir) -> (SessionStore, MemoryDoc) {
        let paths = UserPaths::new(dir.path(), "user-1");
        (
            SessionStore::new(paths.clone()),
            MemoryDoc::new(paths.memory_doc()),
        )
    }

    async fn seed(store: &SessionStore, session: &str, count: usize) {
        for i in 0..count {
            store
                .append_context(session, &StoredMessage::user(format!("msg {i}")))
                .await
                .unwrap();
        }
    }

    fn compactor(threshold: usize, keep_recent: usize) -> Compactor {
        Compactor::new(&CompactionConfig { threshold, keep_recent })
    }

    #[tokio::test]
    async fn below_threshold_never_calls_the_engine() {
        let dir = TempDir::new().unwrap();
        let (store, memory) = fixtures(&dir);
        seed(&store, "s1", 10).await;

        let engine = CannedEngine::new("- should never appear");
        let outcome = compactor(30, 10)
            .run_if_due("s1", &store, &memory, &engine)
            .await;

        assert_eq!(outcome, CompactionOutcome::BelowThreshold { uncompacted: 10 });
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(memory.load().unwrap(), "");
    }

    #[tokio::test]
    async fn due_session_appends_section_and_exactly_one_marker() {
        let dir = TempDir::new().unwrap();
        let (store, memory) = fixtures(&dir);
        seed(&store, "s1", 35).await;

        let engine = CannedEngine::new("- user is training for a marathon\n- race day is 2026-10-04");
        let outcome = compactor(30, 10)
            .run_if_due("s1", &store, &memory, &engine)
            .await;

        assert_eq!(outcome, CompactionOutcome::Compacted { consumed: 25 });
        let doc = memory.load().unwrap();
        assert!(doc.contains("- user is training for a marathon"));
        assert!(doc.contains("- race day is 2026-10-04"));

        let messages = store.load_context("s1").unwrap();
        let markers = messages
            .iter()
            .filter(|m| m.role == Role::CompactionMarker)
            .count();
        assert_eq!(markers, 1);
        assert_eq!(messages.len(), 36);
    }

    #[tokio::test]
    async fn second_pass_without_new_messages_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let (store, memory) = fixtures(&dir);
        seed(&store, "s1", 35).await;

        let engine = CannedEngine::new("- a fact");
        let compactor = compactor(30, 10);
        compactor.run_if_due("s1", &store, &memory, &engine).await;

        // 36 entries, marker at index 35: only 0 messages after the boundary.
        let outcome = compactor.run_if_due("s1", &store, &memory, &engine).await;
        assert_eq!(outcome, CompactionOutcome::BelowThreshold { uncompacted: 0 });
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sentinel_reply_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (store, memory) = fixtures(&dir);
        seed(&store, "s1", 35).await;

        let engine = CannedEngine::new(NOTHING_NEW);
        let outcome = compactor(30, 10)
            .run_if_due("s1", &store, &memory, &engine)
            .await;

        assert_eq!(outcome, CompactionOutcome::NothingNew);
        assert_eq!(memory.load().unwrap(), "");
        let markers = store
            .load_context("s1")
            .unwrap()
            .iter()
            .filter(|m| m.role == Role::CompactionMarker)
            .count();
        assert_eq!(markers, 0);
    }

    #[tokio::test]
    async fn compaction_resumes_after_previous_marker() {
        let dir = TempDir::new().unwrap();
        let (store, memory) = fixtures(&dir);
        seed(&store, "s1", 35).await;

        let engine = CannedEngine::new("- a fact");
        let compactor = compactor(30, 10);
        compactor.run_if_due("s1", &store, &memory, &engine).await;

        // 30 more turns after the marker makes the session due again, and
        // only the post-marker span is consumed.
        seed(&store, "s1", 30).await;
        let outcome = compactor.run_if_due("s1", &store, &memory, &engine).await;
        assert_eq!(outcome, CompactionOutcome::Compacted { consumed: 20 });
    }

    #[tokio::test]
    async fn keep_recent_larger_than_post_marker_span_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let (store, memory) = fixtures(&dir);
        seed(&store, "s1", 10).await;
        store
            .append_context("s1", &StoredMessage::compaction_marker(10))
            .await
            .unwrap();
        seed(&store, "s1", 6).await;

        // Due by threshold, but keep_recent covers the whole post-marker
        // span (and reaches back past the marker).
        let engine = CannedEngine::new("- should never appear");
        let outcome = compactor(5, 15)
            .run_if_due("s1", &store, &memory, &engine)
            .await;

        assert_eq!(outcome, CompactionOutcome::BelowThreshold { uncompacted: 6 });
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(memory.load().unwrap(), "");
    }

    #[test]
    fn extract_facts_keeps_bullets_only() {
        let reply = "Here is what I found:\n- fact one\nsome prose\n* fact two\n";
        assert_eq!(extract_facts(reply), "- fact one\n- fact two");
    }

    #[test]
    fn extract_facts_falls_back_to_catch_all() {
        let reply = "The user mentioned moving house\nnext month.";
        let section = extract_facts(reply);
        assert!(section.starts_with("- (low confidence) "));
        assert!(section.contains("moving house next month."));
    }

    #[test]
    fn marker_boundary_uses_most_recent_marker() {
        let messages = vec![
            StoredMessage::user("a"),
            StoredMessage::compaction_marker(1),
            StoredMessage::user("b"),
            StoredMessage::compaction_marker(1),
            StoredMessage::user("c"),
        ];
        assert_eq!(last_marker_boundary(&messages), 4);
    }

    #[test]
    fn no_marker_means_boundary_zero() {
        let messages = vec![StoredMessage::assistant(MessageContent::Text("x".into()))];
        assert_eq!(last_marker_boundary(&messages), 0);
    }
}
