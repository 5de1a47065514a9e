//! Worker error types.

use thiserror::Error;

use pixpool_models::JobId;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {0} has not been submitted to a provider")]
    NotSubmitted(JobId),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("No channel available")]
    NoChannelAvailable,

    #[error("Store error: {0}")]
    Store(#[from] pixpool_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] pixpool_queue::QueueError),

    #[error("Provider error: {0}")]
    Provider(#[from] pixpool_provider::ProviderError),
}

impl WorkerError {
    pub fn unknown_channel(name: impl Into<String>) -> Self {
        Self::UnknownChannel(name.into())
    }

    /// Transport failures worth retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkerError::Store(pixpool_store::StoreError::Database(_))
                | WorkerError::Queue(_)
                | WorkerError::Provider(_)
        )
    }
}
