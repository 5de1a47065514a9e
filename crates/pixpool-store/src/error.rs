//! Store error types.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job {0} already failed")]
    AlreadyFailed(String),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Insufficient credits for user {user_id}: balance {balance}, required {required}")]
    InsufficientCredits {
        user_id: i64,
        balance: i64,
        required: u32,
    },

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_failed(msg: impl Into<String>) -> Self {
        Self::AlreadyFailed(msg.into())
    }

    pub fn invalid_row(msg: impl Into<String>) -> Self {
        Self::InvalidRow(msg.into())
    }
}
