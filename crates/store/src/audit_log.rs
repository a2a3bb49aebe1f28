//! Date-partitioned append-only audit log, one directory per user.
//!
//! Write-only from the core's perspective: records go in, nothing in the
//! orchestration path ever reads them back.  Operators grep the files.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;

use switchboard_core::{AuditRecord, StoreError};

#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Append one record to the partition named by the record's own
    /// timestamp (`YYYY-MM-DD.jsonl`), so a record written just after
    /// midnight lands in the day it happened.
    pub async fn record(&self, record: &AuditRecord) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let partition = record.timestamp.format("%Y-%m-%d");
        let path = self.dir.join(format!("{partition}.jsonl"));

        let line = serde_json::to_string(record)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}
