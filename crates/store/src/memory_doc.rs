//! The long-term memory document — durable, human-readable extracted facts.

use std::path::PathBuf;

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use switchboard_core::StoreError;

/// Plain-text memory document, updated only by appending dated sections.
/// Earlier sections are never rewritten; the document is its own history.
#[derive(Debug, Clone)]
pub struct MemoryDoc {
    path: PathBuf,
}

impl MemoryDoc {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The whole document.  Absent means no long-term memory yet.
    pub fn load(&self) -> Result<String, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Append one dated section.  The heading carries minute precision so an
    /// operator can correlate sections with the audit log.
    pub async fn append_section(&self, body: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let heading = Utc::now().format("%Y-%m-%d %H:%M");
        let section = format!("\n## {heading}\n\n{}\n", body.trim_end());

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(section.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}
