//! The orchestration hub — composition root of the Switchboard core.
//!
//! Both entry points (real inbound messages and proactive triggers) are
//! routed through the per-session work queue, so a user's message and an
//! in-flight proactive turn for the same session can never interleave.
//! Each turn streams the engine's events into the audit log, persists
//! finalized messages to the context log, fires memory compaction in the
//! background, and hands the response text back to the channel.

mod context;
mod turn;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use switchboard_compactor::Compactor;
use switchboard_config::AppConfig;
use switchboard_core::{
    AuditKind, AuditRecord, Channel, ChannelSpec, EngineFactory, InboundMessage, SILENT_SENTINEL,
    ScheduledEvent, SessionKey,
};
use switchboard_heartbeat::ProactiveSink;
use switchboard_queue::WorkQueue;
use switchboard_store::{AuditLog, MemoryDoc, SessionStore, UserPaths};
use switchboard_watcher::EventSink;

pub use context::{FirstContactHook, UserContext};

use turn::{TurnSettings, audit_best_effort, run_turn, spawn_compaction};

/// Sent (best-effort) when a turn fails unrecoverably.  Internal error text
/// stays in the audit log.
const APOLOGY: &str = "Sorry — something went wrong on my side. Please try again in a moment.";

/// Install the process-wide subscriber, filtered by `RUST_LOG`.  Call once
/// from the embedding binary before constructing a [`Hub`].
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

pub struct Hub {
    config: AppConfig,
    queue: WorkQueue,
    compactor: Compactor,
    engines: Arc<dyn EngineFactory>,
    channels: HashMap<String, Arc<dyn Channel>>,
    contexts: Mutex<HashMap<String, Arc<UserContext>>>,
    first_contact: Option<Arc<dyn FirstContactHook>>,
}

impl Hub {
    pub fn new(
        config: AppConfig,
        engines: Arc<dyn EngineFactory>,
        channels: HashMap<String, Arc<dyn Channel>>,
    ) -> Self {
        let compactor = Compactor::new(&config.compaction);
        Self {
            config,
            queue: WorkQueue::new(),
            compactor,
            engines,
            channels,
            contexts: Mutex::new(HashMap::new()),
            first_contact: None,
        }
    }

    /// Register the hook invoked once per newly seen user.
    pub fn with_first_contact(mut self, hook: Arc<dyn FirstContactHook>) -> Self {
        self.first_contact = Some(hook);
        self
    }

    /// Get or lazily create the user's context.  Check-then-create happens
    /// under the registry lock, so concurrent first contact from several
    /// channels still creates exactly one context (and fires the hook once).
    pub async fn user_context(&self, user_id: &str) -> Result<Arc<UserContext>> {
        let created;
        let ctx = {
            let mut contexts = self.contexts.lock().await;
            match contexts.get(user_id) {
                Some(ctx) => {
                    created = false;
                    Arc::clone(ctx)
                }
                None => {
                    let engine = self
                        .engines
                        .create_for_user(user_id)
                        .with_context(|| format!("create engine for user {user_id}"))?;
                    let paths = UserPaths::new(&self.config.data_dir, user_id);
                    let ctx = Arc::new(UserContext {
                        user_id: user_id.to_string(),
                        engine,
                        store: SessionStore::new(paths.clone()),
                        memory: MemoryDoc::new(paths.memory_doc()),
                        audit: AuditLog::new(paths.audit_dir()),
                        paths,
                    });
                    contexts.insert(user_id.to_string(), Arc::clone(&ctx));
                    created = true;
                    info!(user = %user_id, "user context created");
                    ctx
                }
            }
        };

        if created {
            if let Some(hook) = &self.first_contact {
                hook.on_first_contact(user_id).await;
            }
        }
        Ok(ctx)
    }

    /// Handle a real inbound message.  Resolves when the turn (including
    /// the outbound reply) has fully settled.
    pub async fn handle_message(
        &self,
        message: InboundMessage,
        session: SessionKey,
        channel: Arc<dyn Channel>,
    ) -> Result<()> {
        let ctx = self.user_context(&message.sender_id).await?;
        let settings = self.turn_settings();
        let compactor = self.compactor.clone();
        let session_id = session.session_id();

        self.queue
            .enqueue(&session_id, async move {
                process_message(ctx, message, session, channel, settings, compactor).await
            })
            .await
            .map_err(|err| anyhow!(err))?
    }

    /// Handle a proactive prompt (from a cron schedule or a dropped event
    /// file) through the same serialized path as a real message.
    pub async fn handle_proactive(
        &self,
        user_id: &str,
        prompt: &str,
        session: SessionKey,
        channel: Arc<dyn Channel>,
    ) -> Result<()> {
        let ctx = self.user_context(user_id).await?;
        let settings = self.turn_settings();
        let compactor = self.compactor.clone();
        let session_id = session.session_id();
        let prompt = prompt.to_string();

        self.queue
            .enqueue(&session_id, async move {
                process_proactive(ctx, prompt, session, channel, settings, compactor).await
            })
            .await
            .map_err(|err| anyhow!(err))?
    }

    fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            window: self.config.context.window,
            timeout_secs: self.config.turn.timeout_secs,
        }
    }
}

async fn process_message(
    ctx: Arc<UserContext>,
    message: InboundMessage,
    session: SessionKey,
    channel: Arc<dyn Channel>,
    settings: TurnSettings,
    compactor: Compactor,
) -> Result<()> {
    let session_id = session.session_id();
    audit_best_effort(
        &ctx,
        AuditRecord::new(
            &session_id,
            AuditKind::MsgIn,
            json!({"sender": message.sender_id, "text": message.text}),
        ),
    )
    .await;

    match run_turn(&ctx, &session_id, &message.text, false, &settings).await {
        Ok(response) => {
            spawn_compaction(Arc::clone(&ctx), session_id.clone(), compactor);
            if response.is_empty() {
                return Ok(());
            }
            match channel.send_thread_reply(&session, &response).await {
                Ok(message_id) => {
                    audit_best_effort(
                        &ctx,
                        AuditRecord::new(
                            &session_id,
                            AuditKind::MsgOut,
                            json!({"message_id": message_id, "text": response}),
                        ),
                    )
                    .await;
                    Ok(())
                }
                Err(err) => {
                    error!(session = %session_id, error = %err, "outbound send failed");
                    audit_best_effort(
                        &ctx,
                        AuditRecord::new(
                            &session_id,
                            AuditKind::Error,
                            json!({"stage": "send", "error": err.to_string()}),
                        ),
                    )
                    .await;
                    Err(err.into())
                }
            }
        }
        Err(err) => {
            error!(session = %session_id, error = %err, "turn failed");
            audit_best_effort(
                &ctx,
                AuditRecord::new(
                    &session_id,
                    AuditKind::Error,
                    json!({"stage": "turn", "error": format!("{err:#}")}),
                ),
            )
            .await;
            // Best-effort notification; its own failure is swallowed.
            if let Err(notify_err) = channel.send_thread_reply(&session, APOLOGY).await {
                warn!(session = %session_id, error = %notify_err, "apology message failed too");
            }
            Err(err)
        }
    }
}

async fn process_proactive(
    ctx: Arc<UserContext>,
    prompt: String,
    session: SessionKey,
    channel: Arc<dyn Channel>,
    settings: TurnSettings,
    compactor: Compactor,
) -> Result<()> {
    let session_id = session.session_id();
    audit_best_effort(
        &ctx,
        AuditRecord::new(
            &session_id,
            AuditKind::ProactiveTrigger,
            json!({"prompt": prompt}),
        ),
    )
    .await;

    match run_turn(&ctx, &session_id, &prompt, true, &settings).await {
        Ok(response) => {
            spawn_compaction(Arc::clone(&ctx), session_id.clone(), compactor);
            if response == SILENT_SENTINEL {
                info!(session = %session_id, "proactive turn chose silence");
                audit_best_effort(
                    &ctx,
                    AuditRecord::new(&session_id, AuditKind::ProactiveSilent, json!({})),
                )
                .await;
                return Ok(());
            }
            if response.is_empty() {
                return Ok(());
            }
            let message_id = channel
                .send_thread_reply(&session, &response)
                .await
                .context("send proactive reply")?;
            audit_best_effort(
                &ctx,
                AuditRecord::new(
                    &session_id,
                    AuditKind::MsgOut,
                    json!({"message_id": message_id, "text": response}),
                ),
            )
            .await;
            Ok(())
        }
        Err(err) => {
            error!(session = %session_id, error = %err, "proactive turn failed");
            audit_best_effort(
                &ctx,
                AuditRecord::new(
                    &session_id,
                    AuditKind::Error,
                    json!({"stage": "proactive", "error": format!("{err:#}")}),
                ),
            )
            .await;
            Err(err)
        }
    }
}

// ── Scheduler / watcher wiring ────────────────────────────────────────────────

#[async_trait]
impl ProactiveSink for Hub {
    async fn proactive_prompt(
        &self,
        user_id: &str,
        prompt: &str,
        session: SessionKey,
        channel: Arc<dyn Channel>,
    ) -> Result<()> {
        self.handle_proactive(user_id, prompt, session, channel).await
    }
}

#[async_trait]
impl EventSink for Hub {
    /// Dropped event files reuse the proactive path.  A spec that can never
    /// resolve (bad syntax, unknown channel type) is consumed with a
    /// warning rather than retried forever; only transient failures (DM
    /// creation, the turn itself) bubble up so the watcher keeps the file.
    async fn event_fired(&self, user_id: &str, event: ScheduledEvent) -> Result<()> {
        let Some(spec) = ChannelSpec::parse(&event.channel) else {
            warn!(id = %event.id, channel = %event.channel, "event has unusable channel spec; dropping");
            return Ok(());
        };
        let Some(channel) = self.channels.get(&spec.channel_type).cloned() else {
            warn!(id = %event.id, channel_type = %spec.channel_type, "event names unknown channel; dropping");
            return Ok(());
        };

        let session = if spec.is_dm() {
            channel
                .create_dm_session(user_id)
                .await
                .context("create DM session for event")?
        } else {
            spec.proactive_session()
        };

        self.handle_proactive(user_id, &event.prompt, session, channel)
            .await
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
