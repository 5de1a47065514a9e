//! Worker metrics.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "pixpool_jobs_submitted_total";
    pub const SUBMISSIONS_FAILED_TOTAL: &str = "pixpool_submissions_failed_total";
    pub const AFFINITY_REQUEUES_TOTAL: &str = "pixpool_affinity_requeues_total";
    pub const AFFINITY_DISCARDS_TOTAL: &str = "pixpool_affinity_discards_total";
    pub const PROMPT_REWRITES_TOTAL: &str = "pixpool_prompt_rewrites_total";
    pub const NOTIFICATIONS_SENT_TOTAL: &str = "pixpool_notifications_sent_total";
    pub const JOBS_FINISHED_TOTAL: &str = "pixpool_jobs_finished_total";
    pub const JOBS_FAILED_TOTAL: &str = "pixpool_jobs_failed_total";
    pub const QUEUE_POP_ERRORS_TOTAL: &str = "pixpool_queue_pop_errors_total";
    pub const BINDINGS_LOST_TOTAL: &str = "pixpool_bindings_lost_total";
}

pub fn record_submitted(channel: &str, kind: &str) {
    counter!(
        names::JOBS_SUBMITTED_TOTAL,
        "channel" => channel.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

pub fn record_submission_failed(channel: &str, kind: &str) {
    counter!(
        names::SUBMISSIONS_FAILED_TOTAL,
        "channel" => channel.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

pub fn record_affinity_requeue(channel: &str) {
    counter!(names::AFFINITY_REQUEUES_TOTAL, "channel" => channel.to_string()).increment(1);
}

pub fn record_affinity_discard(channel: &str) {
    counter!(names::AFFINITY_DISCARDS_TOTAL, "channel" => channel.to_string()).increment(1);
}

pub fn record_prompt_rewrite(ok: bool) {
    let status = if ok { "ok" } else { "error" };
    counter!(names::PROMPT_REWRITES_TOTAL, "status" => status).increment(1);
}

pub fn record_notification(delivered: bool) {
    let status = if delivered { "delivered" } else { "dropped" };
    counter!(names::NOTIFICATIONS_SENT_TOTAL, "status" => status).increment(1);
}

pub fn record_finished(kind: &str) {
    counter!(names::JOBS_FINISHED_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// `source` is `submission`, `provider` or `timeout`.
pub fn record_failed(kind: &str, source: &'static str) {
    counter!(
        names::JOBS_FAILED_TOTAL,
        "kind" => kind.to_string(),
        "source" => source
    )
    .increment(1);
}

pub fn record_pop_error(queue: &str) {
    counter!(names::QUEUE_POP_ERRORS_TOTAL, "queue" => queue.to_string()).increment(1);
}

pub fn record_binding_lost(channel: &str) {
    counter!(names::BINDINGS_LOST_TOTAL, "channel" => channel.to_string()).increment(1);
}
