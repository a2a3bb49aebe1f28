//! Hub configuration — every tunable knob of the orchestration core,
//! loaded from a TOML file with per-section defaults.

use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Context window ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum number of context-log entries fed to the reasoning engine per
    /// turn.  The full log is never truncated on disk; this only bounds the
    /// read window.
    pub window: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { window: 50 }
    }
}

// ── Memory compaction ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Minimum number of uncompacted messages before a compaction pass runs.
    pub threshold: usize,
    /// Most-recent messages excluded from every compaction span.  These stay
    /// "hot" — directly visible to the engine rather than only summarized.
    pub keep_recent: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: 30,
            keep_recent: 10,
        }
    }
}

// ── Proactive heartbeat ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    /// Daily cap on proactive triggers per user.  Reset lazily at the first
    /// job firing of a new day.
    pub max_per_day: u32,
    /// Quiet-hours window start, `"HH:MM"` local time.  Proactive triggers
    /// inside `[quiet_start, quiet_end)` are skipped silently.
    pub quiet_start: String,
    /// Quiet-hours window end, `"HH:MM"`.  When start > end the window wraps
    /// past midnight.
    pub quiet_end: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_day: 8,
            quiet_start: "22:00".to_string(),
            quiet_end: "06:00".to_string(),
        }
    }
}

// ── Event watcher ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Seconds between polls of each user's dropped-event directory.  One
    /// extra poll always runs immediately on start.
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
        }
    }
}

// ── Turn execution ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Hard ceiling on one reasoning-engine turn.  A turn that has not
    /// reached idle by then is aborted and logged as an error, freeing the
    /// conversation's queue lane so one stuck call can never wedge a
    /// conversation forever.
    pub timeout_secs: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

// ── Top-level config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for all per-user state (context logs, memory
    /// documents, audit logs, event files, heartbeat documents).
    pub data_dir: String,
    pub context: ContextConfig,
    pub compaction: CompactionConfig,
    pub heartbeat: HeartbeatConfig,
    pub watcher: WatcherConfig,
    pub turn: TurnConfig,
}

impl AppConfig {
    /// Load from `path`, falling back to defaults only when the file is
    /// absent.  A present-but-unreadable or malformed file is an error,
    /// not a silent default.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(toml::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
