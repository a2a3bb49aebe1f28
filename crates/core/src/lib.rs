//! Shared types and collaborator seams for the Switchboard orchestration hub.
//!
//! Everything that crosses a crate boundary lives here: session identity,
//! stored messages, audit records, the typed engine event stream, dropped
//! trigger events, and the traits behind which the reasoning engine and the
//! chat channels sit.

pub mod audit;
pub mod channel;
pub mod engine;
mod error;
pub mod event;
pub mod message;
pub mod session;

pub use audit::{AuditKind, AuditRecord};
pub use channel::{Channel, ChannelSpec, DM_TARGET};
pub use engine::{EngineEvent, EngineFactory, ReasoningEngine};
pub use error::{ChannelError, EngineError, StoreError};
pub use event::{EventKind, ScheduledEvent};
pub use message::{ContentPart, MessageContent, Role, StoredMessage};
pub use session::{InboundMessage, SessionKey};

/// A proactive turn whose full response equals this sentinel produces no
/// outbound message — the engine decided the trigger was not worth the
/// interruption.
pub const SILENT_SENTINEL: &str = "[SILENT]";
