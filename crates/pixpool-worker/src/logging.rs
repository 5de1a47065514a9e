//! Structured job logging utilities.

use tracing::{debug, error, info, warn, Span};

use pixpool_models::{JobId, JobKind};

/// Job logger carrying the job, kind and channel as structured fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    kind: JobKind,
    channel: String,
}

impl JobLogger {
    pub fn new(job_id: JobId, kind: JobKind, channel: &str) -> Self {
        Self {
            job_id,
            kind,
            channel: channel.to_string(),
        }
    }

    pub fn debug(&self, message: &str) {
        debug!(
            job_id = %self.job_id,
            kind = %self.kind,
            channel = %self.channel,
            "{}", message
        );
    }

    pub fn info(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            kind = %self.kind,
            channel = %self.channel,
            "{}", message
        );
    }

    pub fn warn(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            kind = %self.kind,
            channel = %self.channel,
            "{}", message
        );
    }

    pub fn error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            kind = %self.kind,
            channel = %self.channel,
            "{}", message
        );
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Create a tracing span for this job.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            kind = %self.kind,
            channel = %self.channel
        )
    }
}
