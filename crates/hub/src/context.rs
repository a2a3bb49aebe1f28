//! Per-user state owned by the hub.

use std::sync::Arc;

use async_trait::async_trait;

use switchboard_core::ReasoningEngine;
use switchboard_store::{AuditLog, MemoryDoc, SessionStore, UserPaths};

/// Everything the hub holds for one user: their engine instance (configured
/// with the user's persona by the factory), their persistence, and their
/// paths.  Created lazily on first contact, at most once per user, and kept
/// for the process lifetime.
pub struct UserContext {
    pub user_id: String,
    pub engine: Arc<dyn ReasoningEngine>,
    pub store: SessionStore,
    pub memory: MemoryDoc,
    pub audit: AuditLog,
    pub paths: UserPaths,
}

/// Invoked the first time a user id is seen, after their context exists.
/// The composition root uses this to lazily start the user's heartbeat and
/// event watcher — users who never engage cost nothing.
#[async_trait]
pub trait FirstContactHook: Send + Sync {
    async fn on_first_contact(&self, user_id: &str);
}
