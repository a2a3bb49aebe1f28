//! Proactive heartbeat — per-user cron-triggered prompts, gated by a daily
//! cap and a quiet-hours window, routed through the same turn pipeline as a
//! real inbound message.

mod quiet;
mod schedule;
mod scheduler;

pub use quiet::{in_quiet_hours, parse_hhmm};
pub use schedule::{HeartbeatDoc, Schedule, parse_heartbeat_doc};
pub use scheduler::{HeartbeatScheduler, ProactiveSink};
