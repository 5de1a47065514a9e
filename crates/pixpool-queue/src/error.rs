//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Push failed: {0}")]
    PushFailed(String),

    #[error("Pop failed: {0}")]
    PopFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn push_failed(msg: impl Into<String>) -> Self {
        Self::PushFailed(msg.into())
    }

    pub fn pop_failed(msg: impl Into<String>) -> Self {
        Self::PopFailed(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error is a transient store failure that a caller can retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            QueueError::ConnectionFailed(_)
            | QueueError::PushFailed(_)
            | QueueError::PopFailed(_) => true,
            QueueError::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_timeout()
            }
            QueueError::Config(_) | QueueError::Json(_) => false,
        }
    }
}
