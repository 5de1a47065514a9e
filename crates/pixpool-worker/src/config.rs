//! Worker configuration.

use std::time::Duration;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Affinity mismatches tolerated per job before the job is deleted
    pub affinity_max_retries: u32,
    /// Pause after putting a mismatched item back on the queue
    pub requeue_delay: Duration,
    /// Block duration of a single queue pop
    pub pop_block: Duration,
    /// Pause after a failed queue pop
    pub pop_error_backoff: Duration,
    /// Model used for prompt localization
    pub rewrite_model: String,
    /// Interval between progress sync passes
    pub sync_interval: Duration,
    /// In-flight jobs older than this are failed by the progress sync
    pub job_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            affinity_max_retries: 5,
            requeue_delay: Duration::from_secs(1),
            pop_block: Duration::from_secs(1),
            pop_error_backoff: Duration::from_secs(1),
            rewrite_model: "gpt-4o-mini".to_string(),
            sync_interval: Duration::from_secs(5),
            job_timeout: Duration::from_secs(600), // 10 minutes
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            affinity_max_retries: std::env::var("AFFINITY_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            requeue_delay: Duration::from_millis(
                std::env::var("REQUEUE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            pop_block: Duration::from_millis(
                std::env::var("QUEUE_POP_BLOCK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            pop_error_backoff: Duration::from_millis(
                std::env::var("QUEUE_ERROR_BACKOFF_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            rewrite_model: std::env::var("REWRITE_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            sync_interval: Duration::from_secs(
                std::env::var("SYNC_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            job_timeout: Duration::from_secs(
                std::env::var("JOB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }

    /// Config with no waits, for tests.
    pub fn immediate() -> Self {
        Self {
            requeue_delay: Duration::ZERO,
            pop_block: Duration::from_millis(20),
            pop_error_backoff: Duration::from_millis(5),
            ..Default::default()
        }
    }
}
