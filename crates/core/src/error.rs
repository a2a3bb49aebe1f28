use thiserror::Error;

/// Failures at the reasoning-engine seam.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine call failed: {0}")]
    Call(String),
    #[error("engine did not reach idle within {0} seconds")]
    Timeout(u64),
    #[error("engine is not available for user {0}")]
    Unavailable(String),
}

/// Failures at the channel seam.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("no channel of type `{0}` is configured")]
    NotConfigured(String),
    #[error("could not create DM session for user {user}: {reason}")]
    DmCreation { user: String, reason: String },
}

/// Failures in the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}
