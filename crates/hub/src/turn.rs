//! One turn through the reasoning engine: rebuild instructions, replace the
//! working window, drain the event stream, persist and mirror everything.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::Instant;
use tracing::{debug, warn};

use switchboard_compactor::Compactor;
use switchboard_core::{
    AuditKind, AuditRecord, EngineError, EngineEvent, Role, SILENT_SENTINEL, StoredMessage,
};

use crate::context::UserContext;

pub(crate) struct TurnSettings {
    pub window: usize,
    pub timeout_secs: u64,
}

/// Run one full turn for `session_id` with `input` as the new user-side
/// text.  Returns the accumulated assistant response (possibly empty, or
/// exactly [`SILENT_SENTINEL`] for a proactive turn that chose silence).
///
/// Context-log persistence failures are turn errors — losing memory
/// silently is worse than failing the turn.  Audit failures only warn.
pub(crate) async fn run_turn(
    ctx: &Arc<UserContext>,
    session_id: &str,
    input: &str,
    is_proactive: bool,
    settings: &TurnSettings,
) -> Result<String> {
    // Long-term memory may have been compacted since this conversation's
    // last turn; rebuild the instructions every time.
    let memory = ctx.memory.load().context("load long-term memory")?;
    ctx.engine
        .set_system_prompt(&system_instructions(&memory, is_proactive))
        .await
        .context("set system prompt")?;

    let recent = ctx
        .store
        .recent_context(session_id, settings.window)
        .context("load recent context")?;
    ctx.engine
        .replace_messages(recent)
        .await
        .context("replace working messages")?;

    // Subscribe before prompting so no event can be missed.  The receiver
    // is dropped on every exit path, which is what unsubscribes us.
    let mut events = ctx.engine.subscribe();
    ctx.engine.prompt(input).await.context("start turn")?;

    // The inbound text is part of history whether the turn succeeds or not.
    ctx.store
        .append_context(session_id, &StoredMessage::user(input))
        .await
        .context("persist inbound message")?;

    // Drain concurrently with the idle wait: the broadcast buffer is
    // bounded, so parking on idle first would let a chatty turn overwrite
    // finals the receiver has not consumed yet.
    let deadline = Instant::now() + Duration::from_secs(settings.timeout_secs);
    let idle = ctx.engine.wait_for_idle();
    tokio::pin!(idle);
    let mut idle_done = false;
    let mut stream_open = true;

    let mut streamed = String::new();
    let mut finals: Vec<String> = Vec::new();
    loop {
        let event = if idle_done {
            // The engine has settled; whatever is still buffered is all
            // that remains.
            match events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(session = %session_id, missed, "engine event stream lagged");
                    continue;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        } else {
            tokio::select! {
                result = &mut idle => {
                    result.context("wait for idle")?;
                    idle_done = true;
                    continue;
                }
                event = events.recv(), if stream_open => match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(session = %session_id, missed, "engine event stream lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        stream_open = false;
                        continue;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(EngineError::Timeout(settings.timeout_secs))
                        .context("turn did not settle");
                }
            }
        };

        match event {
            EngineEvent::TextDelta(delta) => streamed.push_str(&delta),
            EngineEvent::MessageFinal { role, content } => {
                let message = StoredMessage {
                    role,
                    content: content.clone(),
                    timestamp: chrono::Utc::now(),
                };
                ctx.store
                    .append_context(session_id, &message)
                    .await
                    .context("persist finalized message")?;
                audit_best_effort(
                    ctx,
                    AuditRecord::new(
                        session_id,
                        AuditKind::Message,
                        json!({"role": role, "content": content.as_plain_text()}),
                    ),
                )
                .await;
                if role == Role::Assistant {
                    finals.push(content.as_plain_text());
                }
            }
            EngineEvent::ToolStart { name, arguments } => {
                audit_best_effort(
                    ctx,
                    AuditRecord::new(
                        session_id,
                        AuditKind::ToolStart,
                        json!({"tool": name, "arguments": arguments}),
                    ),
                )
                .await;
            }
            EngineEvent::ToolEnd { name, result, is_error } => {
                audit_best_effort(
                    ctx,
                    AuditRecord::new(
                        session_id,
                        AuditKind::ToolEnd,
                        json!({"tool": name, "result": result, "is_error": is_error}),
                    ),
                )
                .await;
            }
        }
    }

    let response = if finals.is_empty() {
        streamed.trim().to_string()
    } else {
        finals.join("\n").trim().to_string()
    };

    debug!(
        session = %session_id,
        proactive = is_proactive,
        response_len = response.len(),
        "turn settled"
    );
    Ok(response)
}

/// Fire compaction in the background.  Its outcome never affects the turn
/// that triggered it.
pub(crate) fn spawn_compaction(ctx: Arc<UserContext>, session_id: String, compactor: Compactor) {
    tokio::spawn(async move {
        let outcome = compactor
            .run_if_due(&session_id, &ctx.store, &ctx.memory, ctx.engine.as_ref())
            .await;
        debug!(session = %session_id, ?outcome, "compaction pass finished");
    });
}

/// Audit writes must never block or fail the user-visible path.
pub(crate) async fn audit_best_effort(ctx: &Arc<UserContext>, record: AuditRecord) {
    if let Err(err) = ctx.audit.record(&record).await {
        warn!(user = %ctx.user_id, error = %err, "audit write failed");
    }
}

fn system_instructions(memory: &str, is_proactive: bool) -> String {
    let mut instructions = String::new();
    if !memory.trim().is_empty() {
        instructions.push_str("LONG-TERM MEMORY (facts learned across conversations):\n");
        instructions.push_str(memory.trim());
        instructions.push('\n');
    }
    if is_proactive {
        if !instructions.is_empty() {
            instructions.push('\n');
        }
        instructions.push_str(&format!(
            "This turn was triggered proactively, not by the user. Only reach \
out if you have something genuinely useful or timely to say; otherwise \
reply exactly {SILENT_SENTINEL}."
        ));
    }
    instructions
}
