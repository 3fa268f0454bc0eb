//! Unified error types for calnotify.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using CalNotifyError.
pub type Result<T> = std::result::Result<T, CalNotifyError>;

#[derive(Error, Debug)]
pub enum CalNotifyError {
    // Store errors
    #[error("date already busy")]
    DateAlreadyBusy,

    #[error("event not exists: {0}")]
    EventNotFound(Uuid),

    #[error("event already exists: {0}")]
    EventAlreadyExists(Uuid),

    #[error("Store not connected")]
    StoreNotConnected,

    #[error("Storage backend error: {0}")]
    Storage(String),

    // Queue errors
    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Queue not connected: {0}")]
    QueueNotConnected(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("{0}")]
    Other(String),
}

impl CalNotifyError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether a transport layer should report this as a caller mistake
    /// rather than a server failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::DateAlreadyBusy | Self::EventNotFound(_) | Self::EventAlreadyExists(_)
        )
    }
}
