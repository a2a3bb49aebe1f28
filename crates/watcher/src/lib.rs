//! Event watcher — polls a per-user directory for dropped trigger files.
//!
//! `immediate` events fire on the next poll and are deleted; `one-shot`
//! events fire once their `trigger_at` has passed and are deleted then;
//! `periodic` events are never fired or deleted here — recurring triggers
//! belong to the heartbeat scheduler, not to dropped files.  A file whose
//! firing fails stays in place and is retried on a later poll
//! (at-least-once, with idempotent re-processing expected of the sink).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use switchboard_core::{EventKind, ScheduledEvent};

/// Receives fired events — implemented by the composition root, which
/// resolves the event's channel spec and routes the prompt into the hub.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn event_fired(&self, user_id: &str, event: ScheduledEvent) -> anyhow::Result<()>;
}

pub struct EventWatcher {
    user_id: String,
    dir: PathBuf,
    poll_interval: Duration,
    sink: Arc<dyn EventSink>,
}

impl EventWatcher {
    pub fn new(
        user_id: impl Into<String>,
        dir: impl Into<PathBuf>,
        poll_interval: Duration,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            dir: dir.into(),
            poll_interval,
            sink,
        }
    }

    /// Spawn the polling loop: one immediate poll, then one every interval.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                // The first tick completes immediately.
                ticker.tick().await;
                self.poll_once(Utc::now()).await;
            }
        })
    }

    /// One pass over the directory.  Errors on individual files never stop
    /// the remaining files from being processed.
    pub async fn poll_once(&self, now: DateTime<Utc>) {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                warn!(dir = %self.dir.display(), error = %err, "event directory unreadable");
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(dir = %self.dir.display(), error = %err, "event directory iteration failed");
                    break;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            self.process_file(&path, now).await;
        }
    }

    async fn process_file(&self, path: &std::path::Path, now: DateTime<Utc>) {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "event file unreadable");
                return;
            }
        };
        let event: ScheduledEvent = match serde_json::from_str(&raw) {
            Ok(event) => event,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "event file does not parse; leaving in place");
                return;
            }
        };

        match event.kind {
            EventKind::Immediate => {
                self.fire_and_delete(path, event, now).await;
            }
            EventKind::OneShot => {
                let Some(trigger_at) = event.trigger_at else {
                    warn!(file = %path.display(), id = %event.id, "one-shot event without trigger_at; skipping");
                    return;
                };
                if trigger_at <= now {
                    self.fire_and_delete(path, event, now).await;
                } else {
                    debug!(id = %event.id, %trigger_at, "one-shot event not due yet");
                }
            }
            EventKind::Periodic => {
                // Recurring triggers have exactly one source of truth: the
                // cron-based heartbeat schedules.
                debug!(id = %event.id, "ignoring periodic event file");
            }
        }
    }

    async fn fire_and_delete(&self, path: &std::path::Path, event: ScheduledEvent, _now: DateTime<Utc>) {
        let id = event.id.clone();
        if let Err(err) = self.sink.event_fired(&self.user_id, event).await {
            warn!(id = %id, error = %err, "event firing failed; keeping file for retry");
            return;
        }
        info!(id = %id, "event fired; deleting trigger file");
        if let Err(err) = tokio::fs::remove_file(path).await {
            warn!(file = %path.display(), error = %err, "could not delete consumed event file");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        fired: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn event_fired(&self, _user_id: &str, event: ScheduledEvent) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("sink unavailable");
            }
            self.fired.lock().unwrap().push(event.id);
            Ok(())
        }
    }

    fn watcher(dir: &TempDir, sink: Arc<RecordingSink>) -> EventWatcher {
        EventWatcher::new("user-1", dir.path(), Duration::from_secs(30), sink)
    }

    fn write_event(dir: &TempDir, name: &str, kind: &str, trigger_at: Option<&str>) {
        let trigger = trigger_at
            .map(|t| format!("\"triggerAt\": \"{t}\","))
            .unwrap_or_default();
        let raw = format!(
            "{{\"id\": \"{name}\", \"type\": \"{kind}\", \"prompt\": \"go\", \
             \"channel\": \"telegram:DM\", {trigger} \"createdAt\": \"2026-08-25T08:00:00Z\"}}"
        );
        std::fs::write(dir.path().join(format!("{name}.json")), raw).unwrap();
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 25, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn immediate_event_fires_once_and_is_deleted() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let watcher = watcher(&dir, Arc::clone(&sink));

        write_event(&dir, "evt-1", "immediate", None);
        watcher.poll_once(at(9)).await;
        watcher.poll_once(at(10)).await;

        assert_eq!(*sink.fired.lock().unwrap(), vec!["evt-1"]);
        assert!(!dir.path().join("evt-1.json").exists());
    }

    #[tokio::test]
    async fn future_one_shot_survives_polls_until_due() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let watcher = watcher(&dir, Arc::clone(&sink));

        write_event(&dir, "evt-2", "one-shot", Some("2026-08-25T12:00:00Z"));
        watcher.poll_once(at(9)).await;
        watcher.poll_once(at(10)).await;
        watcher.poll_once(at(11)).await;

        assert!(sink.fired.lock().unwrap().is_empty());
        assert!(dir.path().join("evt-2.json").exists());

        watcher.poll_once(at(12)).await;
        assert_eq!(*sink.fired.lock().unwrap(), vec!["evt-2"]);
        assert!(!dir.path().join("evt-2.json").exists());
    }

    #[tokio::test]
    async fn periodic_event_is_never_fired_or_deleted() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let watcher = watcher(&dir, Arc::clone(&sink));

        write_event(&dir, "evt-3", "periodic", None);
        for hour in 9..12 {
            watcher.poll_once(at(hour)).await;
        }

        assert!(sink.fired.lock().unwrap().is_empty());
        assert!(dir.path().join("evt-3.json").exists());
    }

    #[tokio::test]
    async fn malformed_file_does_not_stop_siblings() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let watcher = watcher(&dir, Arc::clone(&sink));

        std::fs::write(dir.path().join("broken.json"), "{nope").unwrap();
        write_event(&dir, "evt-4", "immediate", None);
        watcher.poll_once(at(9)).await;

        assert_eq!(*sink.fired.lock().unwrap(), vec!["evt-4"]);
        // The unparseable file stays for the operator to inspect.
        assert!(dir.path().join("broken.json").exists());
    }

    #[tokio::test]
    async fn one_shot_without_trigger_at_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let watcher = watcher(&dir, Arc::clone(&sink));

        write_event(&dir, "evt-5", "one-shot", None);
        watcher.poll_once(at(9)).await;

        assert!(sink.fired.lock().unwrap().is_empty());
        assert!(dir.path().join("evt-5.json").exists());
    }

    #[tokio::test]
    async fn failed_firing_keeps_the_file_for_retry() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let watcher = watcher(&dir, Arc::clone(&sink));

        write_event(&dir, "evt-6", "immediate", None);
        watcher.poll_once(at(9)).await;

        assert!(dir.path().join("evt-6.json").exists());
    }

    #[tokio::test]
    async fn missing_directory_is_a_quiet_no_op() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let watcher = EventWatcher::new(
            "user-1",
            dir.path().join("never-created"),
            Duration::from_secs(30),
            sink,
        );
        watcher.poll_once(at(9)).await;
    }

    #[tokio::test]
    async fn non_json_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let watcher = watcher(&dir, Arc::clone(&sink));

        std::fs::write(dir.path().join("README.txt"), "not an event").unwrap();
        watcher.poll_once(at(9)).await;
        assert!(sink.fired.lock().unwrap().is_empty());
    }
}
