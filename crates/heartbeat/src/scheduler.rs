//! Per-user cron job runtime.
//!
//! `start_user` loads the user's schedule document and spawns one job task
//! per schedule; `stop_user` aborts them.  Each firing is gated by the daily
//! cap (reset lazily at the first firing of a new day) and the quiet-hours
//! window, then resolved to a concrete channel + session and handed to the
//! hub through [`ProactiveSink`].  Every failure is contained to its own
//! firing: one broken schedule never disables its siblings.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate, Timelike};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use switchboard_config::HeartbeatConfig;
use switchboard_core::{Channel, SessionKey};
use switchboard_store::UserPaths;

use crate::quiet::{in_quiet_hours, parse_hhmm};
use crate::schedule::{Schedule, parse_heartbeat_doc};

/// Where fired prompts go — implemented by the orchestration hub.
#[async_trait]
pub trait ProactiveSink: Send + Sync {
    async fn proactive_prompt(
        &self,
        user_id: &str,
        prompt: &str,
        session: SessionKey,
        channel: Arc<dyn Channel>,
    ) -> anyhow::Result<()>;
}

/// Mutable per-user runner state, touched only by the user's own job tasks.
#[derive(Debug)]
struct RunnerState {
    fired_today: u32,
    last_reset: NaiveDate,
}

/// Effective limits for one user: global defaults overridden by the user's
/// own document.
#[derive(Debug, Clone)]
struct RunnerLimits {
    max_per_day: u32,
    quiet_start: u16,
    quiet_end: u16,
}

/// One running user: gating state, limits, and the channel/sink wiring the
/// job tasks fire through.
pub(crate) struct UserHeartbeat {
    user_id: String,
    state: Mutex<RunnerState>,
    limits: RunnerLimits,
    channels: HashMap<String, Arc<dyn Channel>>,
    sink: Arc<dyn ProactiveSink>,
}

impl UserHeartbeat {
    /// One schedule firing.  `now` is passed in so gating is testable
    /// without a clock.
    pub(crate) async fn fire(&self, schedule: &Schedule, now: chrono::DateTime<Local>) {
        let today = now.date_naive();
        {
            let mut state = self.state.lock().await;
            if state.last_reset != today {
                state.fired_today = 0;
                state.last_reset = today;
            }
            if state.fired_today >= self.limits.max_per_day {
                debug!(
                    user = %self.user_id,
                    schedule = %schedule.id,
                    cap = self.limits.max_per_day,
                    "daily proactive cap reached; skipping"
                );
                return;
            }
        }

        let minute_of_day = (now.time().hour() * 60 + now.time().minute()) as u16;
        if in_quiet_hours(minute_of_day, self.limits.quiet_start, self.limits.quiet_end) {
            debug!(user = %self.user_id, schedule = %schedule.id, "inside quiet hours; skipping");
            return;
        }

        let Some(channel) = self.channels.get(&schedule.channel.channel_type).cloned() else {
            warn!(
                user = %self.user_id,
                schedule = %schedule.id,
                channel_type = %schedule.channel.channel_type,
                "no such channel configured; aborting firing"
            );
            return;
        };

        let session = if schedule.channel.is_dm() {
            match channel.create_dm_session(&self.user_id).await {
                Ok(session) => session,
                Err(err) => {
                    warn!(
                        user = %self.user_id,
                        schedule = %schedule.id,
                        error = %err,
                        "DM session creation failed; aborting firing"
                    );
                    return;
                }
            }
        } else {
            schedule.channel.proactive_session()
        };

        self.state.lock().await.fired_today += 1;

        if let Err(err) = self
            .sink
            .proactive_prompt(&self.user_id, &schedule.prompt, session, channel)
            .await
        {
            warn!(
                user = %self.user_id,
                schedule = %schedule.id,
                error = %err,
                "proactive prompt failed"
            );
        }
    }

    #[cfg(test)]
    async fn fired_today(&self) -> u32 {
        self.state.lock().await.fired_today
    }
}

struct HeartbeatRunner {
    heartbeat: Arc<UserHeartbeat>,
    jobs: Vec<JoinHandle<()>>,
}

/// Owns every user's runner.  `stopped → running` on `start_user`,
/// `running → stopped` on `stop_user`; starting an already-running user is
/// a no-op.
pub struct HeartbeatScheduler {
    data_dir: PathBuf,
    defaults: HeartbeatConfig,
    channels: HashMap<String, Arc<dyn Channel>>,
    sink: Arc<dyn ProactiveSink>,
    runners: Mutex<HashMap<String, HeartbeatRunner>>,
}

impl HeartbeatScheduler {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        defaults: HeartbeatConfig,
        channels: HashMap<String, Arc<dyn Channel>>,
        sink: Arc<dyn ProactiveSink>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            defaults,
            channels,
            sink,
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// Load the user's schedule document and start their cron jobs.
    /// Idempotent: a second start while running is a no-op.
    pub async fn start_user(&self, user_id: &str) {
        let mut runners = self.runners.lock().await;
        if runners.contains_key(user_id) {
            debug!(user = %user_id, "heartbeat already running");
            return;
        }

        let doc = parse_heartbeat_doc(&UserPaths::new(&self.data_dir, user_id).heartbeat_doc());
        if !doc.enabled.unwrap_or(self.defaults.enabled) {
            info!(user = %user_id, "heartbeat disabled for user");
            return;
        }

        let limits = RunnerLimits {
            max_per_day: doc.max_per_day.unwrap_or(self.defaults.max_per_day),
            quiet_start: doc
                .quiet_start
                .as_deref()
                .and_then(parse_hhmm)
                .or_else(|| parse_hhmm(&self.defaults.quiet_start))
                .unwrap_or(22 * 60),
            quiet_end: doc
                .quiet_end
                .as_deref()
                .and_then(parse_hhmm)
                .or_else(|| parse_hhmm(&self.defaults.quiet_end))
                .unwrap_or(6 * 60),
        };

        let heartbeat = Arc::new(UserHeartbeat {
            user_id: user_id.to_string(),
            state: Mutex::new(RunnerState {
                fired_today: 0,
                last_reset: Local::now().date_naive(),
            }),
            limits,
            channels: self.channels.clone(),
            sink: Arc::clone(&self.sink),
        });

        let jobs = doc
            .schedules
            .into_iter()
            .map(|schedule| spawn_job(Arc::clone(&heartbeat), schedule))
            .collect::<Vec<_>>();

        info!(user = %user_id, jobs = jobs.len(), "heartbeat started");
        runners.insert(user_id.to_string(), HeartbeatRunner { heartbeat, jobs });
    }

    /// Abort the user's jobs and drop their runner state.
    pub async fn stop_user(&self, user_id: &str) {
        let Some(runner) = self.runners.lock().await.remove(user_id) else {
            return;
        };
        for job in &runner.jobs {
            job.abort();
        }
        info!(user = %user_id, "heartbeat stopped");
    }

    pub async fn is_running(&self, user_id: &str) -> bool {
        self.runners.lock().await.contains_key(user_id)
    }

    pub async fn job_count(&self, user_id: &str) -> usize {
        self.runners
            .lock()
            .await
            .get(user_id)
            .map(|runner| runner.jobs.len())
            .unwrap_or(0)
    }

    /// Triggers already fired for the user today.  Operator/diagnostic
    /// surface; the gating itself lives in the job tasks.
    pub async fn fired_today(&self, user_id: &str) -> u32 {
        let runners = self.runners.lock().await;
        match runners.get(user_id) {
            Some(runner) => runner.heartbeat.state.lock().await.fired_today,
            None => 0,
        }
    }
}

/// One cron job: sleep to the next fire time, fire, repeat.  The expression
/// was validated at parse time; an unparseable one here means the document
/// changed underneath us, so the job just ends.
fn spawn_job(heartbeat: Arc<UserHeartbeat>, schedule: Schedule) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Ok(cron_schedule) = cron::Schedule::from_str(&schedule.cron) else {
            warn!(schedule = %schedule.id, cron = %schedule.cron, "cron expression no longer parses");
            return;
        };

        loop {
            let Some(next) = cron_schedule.upcoming(Local).next() else {
                debug!(schedule = %schedule.id, "cron schedule has no future firings");
                return;
            };
            let wait = (next - Local::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(wait).await;
            heartbeat.fire(&schedule, Local::now()).await;
        }
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────
