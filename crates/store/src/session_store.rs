//! Append-only per-conversation context log.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader};

use tokio::io::AsyncWriteExt;
use tracing::warn;

use switchboard_core::{StoredMessage, StoreError};

use crate::paths::UserPaths;

/// One user's context logs, one JSONL file per session.
///
/// The log is strictly append-only: existing entries are never edited or
/// deleted, and every append lands after everything previously written for
/// that session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    paths: UserPaths,
}

impl SessionStore {
    pub fn new(paths: UserPaths) -> Self {
        Self { paths }
    }

    pub async fn append_context(
        &self,
        session_id: &str,
        message: &StoredMessage,
    ) -> Result<(), StoreError> {
        self.append_context_batch(session_id, std::slice::from_ref(message))
            .await
    }

    /// Append a batch of messages in order, with a single flush+fsync at the
    /// end so the batch survives a crash immediately after the call returns.
    pub async fn append_context_batch(
        &self,
        session_id: &str,
        messages: &[StoredMessage],
    ) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }

        let path = self.paths.context_log(session_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        for message in messages {
            let line = serde_json::to_string(message)?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Every stored message for the session, in write order.  A session with
    /// no log yet is simply a new conversation: empty, not an error.
    /// Corrupt lines are skipped with a warning.
    pub fn load_context(&self, session_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let path = self.paths.context_log(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = OpenOptions::new().read(true).open(&path)?;
        let reader = BufReader::new(file);
        let mut messages = Vec::new();

        for (line_idx, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredMessage>(&line) {
                Ok(message) => messages.push(message),
                Err(err) => {
                    warn!(
                        session = %session_id,
                        line = line_idx + 1,
                        error = %err,
                        "corrupt context-log line skipped"
                    );
                }
            }
        }

        Ok(messages)
    }

    /// At most the last `window` entries, in write order — the suffix of
    /// [`SessionStore::load_context`].  Read-only; the underlying log is
    /// never touched.
    pub fn recent_context(
        &self,
        session_id: &str,
        window: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let mut messages = self.load_context(session_id)?;
        if messages.len() > window {
            let skip = messages.len() - window;
            messages.drain(..skip);
        }
        Ok(messages)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
