//! Provider status reconciliation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use pixpool_models::{Job, Progress};
use pixpool_provider::GenerationChannel;
use pixpool_queue::NotifyMessage;
use pixpool_store::{JobStore, StoreError};

use crate::dispatcher::publish_event;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::NotifyQueue;

/// Result of reconciling one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing observable changed; no event was published.
    Unchanged,
    /// Progress moved forward.
    Progressed(Progress),
    /// The provider reported a failure.
    Failed { reason: String },
}

/// Merges a provider's view of a task into the stored job.
pub struct StatusReconciler {
    channels: HashMap<String, Arc<dyn GenerationChannel>>,
    jobs: Arc<dyn JobStore>,
    notifications: NotifyQueue,
}

impl StatusReconciler {
    pub fn new(
        channels: HashMap<String, Arc<dyn GenerationChannel>>,
        jobs: Arc<dyn JobStore>,
        notifications: NotifyQueue,
    ) -> Self {
        Self {
            channels,
            jobs,
            notifications,
        }
    }

    /// Query the job's channel and persist what changed.
    ///
    /// `job` is only modified once the store accepted the update. Terminal
    /// jobs are left alone without a provider call. At most one event is
    /// published.
    pub async fn reconcile(&self, job: &mut Job) -> WorkerResult<ReconcileOutcome> {
        if job.progress.is_terminal() {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let task_id = match job.task_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => return Err(WorkerError::NotSubmitted(job.id)),
        };
        let channel_name = job.channel_id.as_deref().unwrap_or_default();
        let channel = self
            .channels
            .get(channel_name)
            .ok_or_else(|| WorkerError::unknown_channel(channel_name))?;

        let status = channel.query_task(task_id).await?;
        let mut next = job.clone();

        if let Some(reason) = status.failure() {
            let reason = reason.to_string();
            next.fail(reason.clone());
            if !self.persist(&next).await? {
                return Ok(ReconcileOutcome::Unchanged);
            }
            *job = next;

            info!(job_id = %job.id, task_id = %task_id_of(job), "Provider reported failure: {}", reason);
            publish_event(&self.notifications, NotifyMessage::failed(job.user_id, job.id)).await;
            metrics::record_failed(job.kind.as_str(), "provider");
            return Ok(ReconcileOutcome::Failed { reason });
        }

        if let Some(hash) = status.hash() {
            next.hash = Some(hash);
        }
        let previous = next.progress;
        next.progress = previous.advance(Progress::parse_reported(status.progress.as_deref()));
        if let Some(prompt) = status.prompt_en.as_deref().filter(|p| !p.is_empty()) {
            next.prompt = prompt.to_string();
        }
        if let Some(url) = status.image_url.as_deref().filter(|u| !u.is_empty()) {
            next.image_url = Some(url.to_string());
        }

        if !self.persist(&next).await? {
            return Ok(ReconcileOutcome::Unchanged);
        }
        *job = next;

        if job.progress == previous {
            debug!(job_id = %job.id, progress = job.progress.to_db(), "Progress unchanged");
            return Ok(ReconcileOutcome::Unchanged);
        }

        let event = if job.progress.is_finished() {
            metrics::record_finished(job.kind.as_str());
            NotifyMessage::finished(job.user_id, job.id)
        } else {
            NotifyMessage::running(job.user_id, job.id)
        };
        debug!(
            job_id = %job.id,
            progress = job.progress.to_db(),
            status = %event.message,
            "Progress advanced"
        );
        if !publish_event(&self.notifications, event).await {
            warn!(job_id = %job.id, "Progress change not announced");
        }
        Ok(ReconcileOutcome::Progressed(job.progress))
    }

    /// Write `next`. Returns false when the stored row already failed.
    async fn persist(&self, next: &Job) -> WorkerResult<bool> {
        match self.jobs.update(next).await {
            Ok(()) => Ok(true),
            Err(StoreError::AlreadyFailed(_)) => {
                debug!(job_id = %next.id, "Job failed meanwhile, dropping provider status");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }
}

fn task_id_of(job: &Job) -> &str {
    job.task_id.as_deref().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeChannel;
    use pixpool_models::{JobKind, NewJob, NotifyKind};
    use pixpool_provider::{TaskButton, TaskStatus};
    use pixpool_queue::{MemoryQueue, PersistentQueue};
    use pixpool_store::MemoryJobStore;

    struct Harness {
        channel: FakeChannel,
        jobs: Arc<MemoryJobStore>,
        notifications: Arc<MemoryQueue<NotifyMessage>>,
        reconciler: StatusReconciler,
    }

    fn harness() -> Harness {
        let channel = FakeChannel::accepting("A", 1, "task-1");
        let jobs = Arc::new(MemoryJobStore::new());
        let notifications = Arc::new(MemoryQueue::new("notify"));
        let mut channels: HashMap<String, Arc<dyn GenerationChannel>> = HashMap::new();
        channels.insert("A".into(), Arc::new(channel.clone()));
        let reconciler = StatusReconciler::new(channels, jobs.clone(), notifications.clone());
        Harness {
            channel,
            jobs,
            notifications,
            reconciler,
        }
    }

    async fn submitted_job(h: &Harness, progress: u8) -> Job {
        let mut job = h
            .jobs
            .create(NewJob {
                kind: JobKind::Generate,
                user_id: 7,
                prompt: "一只猫".into(),
                reference_id: None,
                credit_cost: 10,
            })
            .await
            .unwrap();
        job.bind("task-1", "A");
        job.progress = Progress::Percent(progress);
        h.jobs.update(&job).await.unwrap();
        job
    }

    fn status(progress: &str) -> TaskStatus {
        TaskStatus {
            progress: Some(progress.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_progress_advance_publishes_running() {
        let h = harness();
        let mut job = submitted_job(&h, 0).await;
        h.channel.set_status("task-1", status("40%"));

        let outcome = h.reconciler.reconcile(&mut job).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Progressed(Progress::Percent(40)));
        assert_eq!(job.progress, Progress::Percent(40));

        let events = h.notifications.snapshot().await;
        assert_eq!(events, vec![NotifyMessage::running(7, job.id)]);
    }

    #[tokio::test]
    async fn test_same_progress_publishes_nothing() {
        let h = harness();
        let mut job = submitted_job(&h, 40).await;
        h.channel.set_status("task-1", status("40%"));

        let outcome = h.reconciler.reconcile(&mut job).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert!(h.notifications.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_lower_reported_progress_never_regresses() {
        let h = harness();
        let mut job = submitted_job(&h, 60).await;
        h.channel.set_status("task-1", status("20%"));

        assert_eq!(
            h.reconciler.reconcile(&mut job).await.unwrap(),
            ReconcileOutcome::Unchanged
        );
        assert_eq!(job.progress, Progress::Percent(60));
    }

    #[tokio::test]
    async fn test_completion_updates_fields_and_publishes_finish() {
        let h = harness();
        let mut job = submitted_job(&h, 80).await;
        h.channel.set_status(
            "task-1",
            TaskStatus {
                progress: Some("100%".into()),
                image_url: Some("https://cdn.example/img.png".into()),
                prompt_en: Some("a cat".into()),
                buttons: vec![TaskButton {
                    custom_id: "MJ::JOB::upsample::1::abc123".into(),
                    label: "U1".into(),
                    emoji: String::new(),
                }],
                ..Default::default()
            },
        );

        let outcome = h.reconciler.reconcile(&mut job).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Progressed(Progress::Percent(100)));

        let stored = h.jobs.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.hash.as_deref(), Some("abc123"));
        assert_eq!(stored.prompt, "a cat");
        assert_eq!(stored.image_url.as_deref(), Some("https://cdn.example/img.png"));
        assert_eq!(
            h.notifications.snapshot().await,
            vec![NotifyMessage::finished(7, job.id)]
        );
    }

    #[tokio::test]
    async fn test_failure_reason_fails_job_once() {
        let h = harness();
        let mut job = submitted_job(&h, 10).await;
        h.channel.set_status(
            "task-1",
            TaskStatus {
                fail_reason: Some("NSFW".into()),
                ..Default::default()
            },
        );

        let outcome = h.reconciler.reconcile(&mut job).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Failed {
                reason: "NSFW".into()
            }
        );
        assert_eq!(job.progress, Progress::Failed);
        assert_eq!(job.error_message.as_deref(), Some("NSFW"));

        let events = h.notifications.snapshot().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, NotifyKind::Failed);

        // Terminal now: no further query or event.
        let calls_before = h.channel.calls().len();
        assert_eq!(
            h.reconciler.reconcile(&mut job).await.unwrap(),
            ReconcileOutcome::Unchanged
        );
        assert_eq!(h.channel.calls().len(), calls_before);
        assert_eq!(h.notifications.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_copy_does_not_revive_failed_job() {
        let h = harness();
        let mut stale = submitted_job(&h, 50).await;
        let mut failed = stale.clone();
        failed.fail("Task timed out after 60 seconds");
        h.jobs.update(&failed).await.unwrap();
        h.channel.set_status("task-1", status("100%"));

        let outcome = h.reconciler.reconcile(&mut stale).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(stale.progress, Progress::Percent(50));

        let stored = h.jobs.get(failed.id).await.unwrap().unwrap();
        assert_eq!(stored.progress, Progress::Failed);
        assert!(h.notifications.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_query_error_leaves_job_untouched() {
        let h = harness();
        let mut job = submitted_job(&h, 30).await;
        let before = job.clone();
        h.channel.set_query_error("task-1");

        let err = h.reconciler.reconcile(&mut job).await.unwrap_err();
        assert!(matches!(err, WorkerError::Provider(_)));
        assert_eq!(job.progress, before.progress);
        assert!(h.notifications.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_unsubmitted_and_unknown_channel() {
        let h = harness();
        let mut job = h
            .jobs
            .create(NewJob {
                kind: JobKind::Upscale,
                user_id: 7,
                prompt: String::new(),
                reference_id: None,
                credit_cost: 5,
            })
            .await
            .unwrap();
        assert!(matches!(
            h.reconciler.reconcile(&mut job).await,
            Err(WorkerError::NotSubmitted(_))
        ));

        job.bind("task-2", "Z");
        assert!(matches!(
            h.reconciler.reconcile(&mut job).await,
            Err(WorkerError::UnknownChannel(name)) if name == "Z"
        ));
    }
}
