//! Per-channel work loop.
//!
//! Every configured channel runs one [`ChannelWorker`]. All workers pull from
//! the same inbound queue, so the first free worker claims the next item.
//! Items bound to another channel are put back for the right worker to find.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{error, info, Instrument};

use pixpool_models::JobId;
use pixpool_provider::{
    needs_rewrite, AcceptedCodes, ActionRequest, GenerateRequest, GenerationChannel,
    PromptRewriter, ProviderResult, SubmitResult,
};
use pixpool_queue::{ActionTarget, NotifyMessage, TaskPayload, WorkItem};
use pixpool_store::JobStore;

use crate::config::WorkerConfig;
use crate::dispatcher::publish_event;
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_async, FailureTracker, RetryPolicy};
use crate::{NotifyQueue, TaskQueue};

/// What happened to one dequeued item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Bound to another channel and put back on the queue.
    Requeued { attempts: u32 },
    /// Bound to another channel too many times; the job was deleted.
    Discarded,
    /// The job no longer exists; the item was dropped.
    Missing,
    /// Could not load the job; the item was put back for a later attempt.
    Deferred { error: String },
    /// The provider accepted the submission.
    Submitted { task_id: String },
    /// The provider accepted the submission but the binding could not be
    /// saved; the job cannot be reconciled until it is relinked.
    Unbound { task_id: String, error: String },
    /// The provider refused the submission or the call failed; the job failed.
    Rejected { reason: String },
}

/// Shared collaborators handed to every worker in a pool.
#[derive(Clone)]
pub struct WorkerDeps {
    pub tasks: TaskQueue,
    pub notifications: NotifyQueue,
    pub jobs: Arc<dyn JobStore>,
    pub rewriter: Arc<dyn PromptRewriter>,
    pub accepted_codes: AcceptedCodes,
    pub config: WorkerConfig,
}

/// Pulls work items and submits them to one generation channel.
pub struct ChannelWorker {
    channel: Arc<dyn GenerationChannel>,
    deps: WorkerDeps,
    /// Affinity mismatches seen by this worker, per job.
    retry_counts: Mutex<HashMap<JobId, u32>>,
    enabled: AtomicBool,
}

impl ChannelWorker {
    pub fn new(channel: Arc<dyn GenerationChannel>, deps: WorkerDeps) -> Self {
        Self {
            channel,
            deps,
            retry_counts: Mutex::new(HashMap::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Channel identity.
    pub fn name(&self) -> &str {
        self.channel.name()
    }

    pub fn channel(&self) -> &Arc<dyn GenerationChannel> {
        &self.channel
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// A disabled worker stops pulling from the queue.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Affinity mismatches recorded for `job_id`.
    pub async fn retry_count(&self, job_id: JobId) -> u32 {
        self.retry_counts
            .lock()
            .await
            .get(&job_id)
            .copied()
            .unwrap_or(0)
    }

    /// Pull and process items until shutdown is signalled.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(channel = %self.name(), "Starting channel worker");
        let config = &self.deps.config;
        let mut failures = FailureTracker::new(3);

        while !*shutdown.borrow() {
            if !self.is_enabled() {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(config.pop_block) => {}
                }
                continue;
            }

            match self.deps.tasks.pop_timeout(config.pop_block).await {
                Ok(Some(item)) => {
                    failures.record_success();
                    self.process_item(item).await;
                }
                Ok(None) => failures.record_success(),
                Err(e) => {
                    metrics::record_pop_error(self.deps.tasks.name());
                    if failures.record_failure() {
                        error!(channel = %self.name(), "Failed to pop work item: {}", e);
                    }
                    tokio::time::sleep(config.pop_error_backoff).await;
                }
            }
        }

        info!(channel = %self.name(), "Channel worker stopped");
    }

    /// Process one dequeued item. Makes at most one provider call.
    pub async fn process_item(&self, item: WorkItem) -> WorkOutcome {
        let logger = JobLogger::new(item.job_id, item.kind(), self.name());
        let span = logger.span();
        self.process_with_logger(item, &logger).instrument(span).await
    }

    async fn process_with_logger(&self, mut item: WorkItem, logger: &JobLogger) -> WorkOutcome {
        if let Some(target) = item.target_channel() {
            if target != self.name() {
                return self.handle_mismatch(item, logger).await;
            }
        }

        self.localize(&mut item.payload, logger).await;

        let mut job = match self.deps.jobs.get(item.job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                logger.warn("Job not found, dropping work item");
                self.forget(item.job_id).await;
                return WorkOutcome::Missing;
            }
            Err(e) => {
                let error = e.to_string();
                logger.error(&format!("Failed to load job, requeueing: {}", error));
                if let Err(e) = self.deps.tasks.push(item).await {
                    logger.error(&format!("Failed to requeue work item: {}", e));
                }
                tokio::time::sleep(self.deps.config.pop_error_backoff).await;
                return WorkOutcome::Deferred { error };
            }
        };

        logger.info("Submitting task");
        let result = self.submit(&item.payload).await;
        self.forget(item.job_id).await;

        let kind = item.kind();
        match result {
            Ok(res) if self.deps.accepted_codes.is_accepted(res.code) && !res.task_id.is_empty() => {
                job.bind(res.task_id.clone(), self.name());
                metrics::record_submitted(self.name(), kind.as_str());
                let policy = RetryPolicy::default();
                if let Err(e) =
                    retry_async(&policy, "persist_binding", || self.deps.jobs.update(&job)).await
                {
                    let error = e.to_string();
                    logger.error(&format!(
                        "Task {} accepted but binding not saved: {}",
                        res.task_id, error
                    ));
                    metrics::record_binding_lost(self.name());
                    return WorkOutcome::Unbound {
                        task_id: res.task_id,
                        error,
                    };
                }
                logger.info(&format!("Task accepted: {} (code {})", res.task_id, res.code));
                WorkOutcome::Submitted {
                    task_id: res.task_id,
                }
            }
            other => {
                let reason = rejection_reason(other);
                logger.error(&format!("Task submission failed: {}", reason));

                job.fail(reason.clone());
                if let Err(e) = self.deps.jobs.update(&job).await {
                    logger.error(&format!("Failed to persist failure: {}", e));
                }
                publish_event(
                    &self.deps.notifications,
                    NotifyMessage::failed(job.user_id, job.id),
                )
                .await;
                metrics::record_submission_failed(self.name(), kind.as_str());
                metrics::record_failed(kind.as_str(), "submission");
                WorkOutcome::Rejected { reason }
            }
        }
    }

    async fn handle_mismatch(&self, item: WorkItem, logger: &JobLogger) -> WorkOutcome {
        let job_id = item.job_id;
        let attempts = {
            let mut counts = self.retry_counts.lock().await;
            let count = counts.entry(job_id).or_insert(0);
            *count += 1;
            *count
        };

        if attempts > self.deps.config.affinity_max_retries {
            logger.warn(&format!(
                "Task bound to channel {:?} is unroutable after {} attempts, deleting job",
                item.target_channel(),
                attempts - 1
            ));
            if let Err(e) = self.deps.jobs.delete(job_id).await {
                logger.error(&format!("Failed to delete unroutable job: {}", e));
            }
            self.forget(job_id).await;
            metrics::record_affinity_discard(self.name());
            return WorkOutcome::Discarded;
        }

        logger.debug(&format!(
            "Task bound to channel {:?}, requeueing (attempt {})",
            item.target_channel(),
            attempts
        ));
        if let Err(e) = self.deps.tasks.push(item).await {
            logger.error(&format!("Failed to requeue work item: {}", e));
        }
        metrics::record_affinity_requeue(self.name());
        tokio::time::sleep(self.deps.config.requeue_delay).await;
        WorkOutcome::Requeued { attempts }
    }

    async fn forget(&self, job_id: JobId) {
        self.retry_counts.lock().await.remove(&job_id);
    }

    /// Rewrite non-Latin prompts. Failures keep the original text.
    async fn localize(&self, payload: &mut TaskPayload, logger: &JobLogger) {
        if let TaskPayload::Generate {
            prompt,
            negative_prompt,
            ..
        } = payload
        {
            self.rewrite_in_place(prompt, logger).await;
            self.rewrite_in_place(negative_prompt, logger).await;
        }
    }

    async fn rewrite_in_place(&self, text: &mut String, logger: &JobLogger) {
        if text.is_empty() || !needs_rewrite(text) {
            return;
        }
        match self
            .deps
            .rewriter
            .rewrite(text, &self.deps.config.rewrite_model)
            .await
        {
            Ok(rewritten) => {
                logger.debug(&format!("Rewrote prompt: {}", rewritten));
                metrics::record_prompt_rewrite(true);
                *text = rewritten;
            }
            Err(e) => {
                logger.warn(&format!("Prompt rewrite failed, keeping original: {}", e));
                metrics::record_prompt_rewrite(false);
            }
        }
    }

    async fn submit(&self, payload: &TaskPayload) -> ProviderResult<SubmitResult> {
        match payload {
            TaskPayload::Generate {
                prompt,
                negative_prompt,
                params,
                image_urls,
            } => {
                let request = GenerateRequest {
                    prompt: prompt.clone(),
                    negative_prompt: negative_prompt.clone(),
                    params: params.clone(),
                    image_urls: image_urls.clone(),
                };
                self.channel.submit_generate(&request).await
            }
            TaskPayload::Upscale(target) => {
                self.channel.submit_upscale(&action_request(target)).await
            }
            TaskPayload::Variation(target) => {
                self.channel.submit_variation(&action_request(target)).await
            }
            TaskPayload::Blend { image_urls } => self.channel.submit_blend(image_urls).await,
            TaskPayload::FaceSwap { image_urls } => {
                self.channel.submit_face_swap(image_urls).await
            }
        }
    }
}

fn action_request(target: &ActionTarget) -> ActionRequest {
    ActionRequest {
        index: target.index,
        message_id: target.message_id.clone(),
        message_hash: target.message_hash.clone(),
    }
}

fn rejection_reason(result: ProviderResult<SubmitResult>) -> String {
    match result {
        Ok(res) if res.task_id.is_empty() && !res.description.is_empty() => {
            format!("code {}: {}", res.code, res.description)
        }
        Ok(res) if res.task_id.is_empty() => format!("code {}: no task id returned", res.code),
        Ok(res) => format!("code {}: {}", res.code, res.description),
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChannel, NoopRewriter};
    use pixpool_models::{JobKind, NewJob, NotifyKind, Progress};
    use pixpool_queue::{MemoryQueue, PersistentQueue};
    use async_trait::async_trait;
    use pixpool_models::Job;
    use pixpool_store::{JobFilter, MemoryJobStore, StoreError, StoreResult};
    use std::sync::atomic::AtomicU32;

    /// Job store whose first `failures` updates fail.
    struct FlakyJobs {
        inner: Arc<MemoryJobStore>,
        failures: AtomicU32,
    }

    #[async_trait]
    impl JobStore for FlakyJobs {
        async fn create(&self, job: NewJob) -> StoreResult<Job> {
            self.inner.create(job).await
        }

        async fn get(&self, id: JobId) -> StoreResult<Option<Job>> {
            self.inner.get(id).await
        }

        async fn update(&self, job: &Job) -> StoreResult<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::invalid_row("connection reset"));
            }
            self.inner.update(job).await
        }

        async fn delete(&self, id: JobId) -> StoreResult<bool> {
            self.inner.delete(id).await
        }

        async fn find_by_task_id(&self, task_id: &str) -> StoreResult<Option<Job>> {
            self.inner.find_by_task_id(task_id).await
        }

        async fn list(&self, filter: &JobFilter) -> StoreResult<Vec<Job>> {
            self.inner.list(filter).await
        }

        async fn list_in_flight(&self) -> StoreResult<Vec<Job>> {
            self.inner.list_in_flight().await
        }

        async fn set_publish(&self, id: JobId, publish: bool) -> StoreResult<bool> {
            self.inner.set_publish(id, publish).await
        }
    }

    struct Harness {
        tasks: Arc<MemoryQueue<WorkItem>>,
        notifications: Arc<MemoryQueue<NotifyMessage>>,
        jobs: Arc<MemoryJobStore>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                tasks: Arc::new(MemoryQueue::new("tasks")),
                notifications: Arc::new(MemoryQueue::new("notify")),
                jobs: Arc::new(MemoryJobStore::new()),
            }
        }

        fn worker(&self, channel: FakeChannel) -> ChannelWorker {
            ChannelWorker::new(
                Arc::new(channel),
                WorkerDeps {
                    tasks: self.tasks.clone(),
                    notifications: self.notifications.clone(),
                    jobs: self.jobs.clone(),
                    rewriter: Arc::new(NoopRewriter),
                    accepted_codes: AcceptedCodes::default(),
                    config: WorkerConfig::immediate(),
                },
            )
        }

        fn worker_with_jobs(&self, channel: FakeChannel, jobs: Arc<dyn JobStore>) -> ChannelWorker {
            ChannelWorker::new(
                Arc::new(channel),
                WorkerDeps {
                    tasks: self.tasks.clone(),
                    notifications: self.notifications.clone(),
                    jobs,
                    rewriter: Arc::new(NoopRewriter),
                    accepted_codes: AcceptedCodes::default(),
                    config: WorkerConfig::immediate(),
                },
            )
        }

        fn flaky_jobs(&self, failures: u32) -> Arc<dyn JobStore> {
            Arc::new(FlakyJobs {
                inner: self.jobs.clone(),
                failures: AtomicU32::new(failures),
            })
        }

        async fn job(&self, kind: JobKind) -> JobId {
            self.jobs
                .create(NewJob {
                    kind,
                    user_id: 1,
                    prompt: "a cat".into(),
                    reference_id: None,
                    credit_cost: 10,
                })
                .await
                .unwrap()
                .id
        }
    }

    fn upscale(job_id: JobId, channel: &str) -> WorkItem {
        WorkItem::new(
            job_id,
            1,
            TaskPayload::Upscale(ActionTarget {
                index: 1,
                message_id: "m".into(),
                message_hash: "h".into(),
            }),
        )
        .with_channel(channel)
    }

    fn generate(job_id: JobId) -> WorkItem {
        WorkItem::new(
            job_id,
            1,
            TaskPayload::Generate {
                prompt: "a cat".into(),
                negative_prompt: String::new(),
                params: Default::default(),
                image_urls: vec![],
            },
        )
    }

    #[tokio::test]
    async fn test_binding_write_is_retried() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Generate).await;
        let worker = h.worker_with_jobs(FakeChannel::accepting("A", 1, "task-r"), h.flaky_jobs(1));

        let outcome = worker.process_item(generate(job_id)).await;
        assert_eq!(
            outcome,
            WorkOutcome::Submitted {
                task_id: "task-r".into()
            }
        );
        let job = h.jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.task_id.as_deref(), Some("task-r"));
        assert_eq!(job.channel_id.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_unsaved_binding_is_reported() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Generate).await;
        let channel = FakeChannel::accepting("A", 1, "task-u");
        let worker = h.worker_with_jobs(channel.clone(), h.flaky_jobs(u32::MAX));

        let outcome = worker.process_item(generate(job_id)).await;
        assert!(matches!(
            outcome,
            WorkOutcome::Unbound { ref task_id, .. } if task_id == "task-u"
        ));
        assert_eq!(channel.calls(), vec!["generate".to_string()]);
        assert!(h.jobs.get(job_id).await.unwrap().unwrap().task_id.is_none());
        assert!(h.notifications.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_matching_channel_submits() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Upscale).await;
        let channel = FakeChannel::accepting("A", 1, "task-1");
        let worker = h.worker(channel.clone());

        let outcome = worker.process_item(upscale(job_id, "A")).await;
        assert_eq!(
            outcome,
            WorkOutcome::Submitted {
                task_id: "task-1".into()
            }
        );
        assert_eq!(channel.calls(), vec!["upscale".to_string()]);

        let job = h.jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.task_id.as_deref(), Some("task-1"));
        assert_eq!(job.channel_id.as_deref(), Some("A"));
        assert!(h.notifications.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_mismatch_requeues_without_calling_provider() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Upscale).await;
        let channel = FakeChannel::accepting("B", 1, "task-1");
        let worker = h.worker(channel.clone());

        let outcome = worker.process_item(upscale(job_id, "A")).await;
        assert_eq!(outcome, WorkOutcome::Requeued { attempts: 1 });
        assert_eq!(worker.retry_count(job_id).await, 1);
        assert!(channel.calls().is_empty());
        assert_eq!(h.tasks.snapshot().await, vec![upscale(job_id, "A")]);
    }

    #[tokio::test]
    async fn test_sixth_mismatch_deletes_job() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Variation).await;
        let channel = FakeChannel::accepting("B", 1, "task-1");
        let worker = h.worker(channel.clone());

        for attempt in 1..=5 {
            let item = h.tasks.pop_timeout(std::time::Duration::ZERO).await.unwrap();
            let item = item.unwrap_or_else(|| upscale(job_id, "A"));
            assert_eq!(
                worker.process_item(item).await,
                WorkOutcome::Requeued { attempts: attempt }
            );
        }

        let item = h.tasks.pop_blocking().await.unwrap();
        assert_eq!(worker.process_item(item).await, WorkOutcome::Discarded);
        assert!(h.jobs.get(job_id).await.unwrap().is_none());
        assert!(h.tasks.is_empty().await.unwrap());
        assert_eq!(worker.retry_count(job_id).await, 0);
        assert!(channel.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_job_is_dropped() {
        let h = Harness::new();
        let channel = FakeChannel::accepting("A", 1, "task-1");
        let worker = h.worker(channel.clone());

        let outcome = worker.process_item(generate(JobId(404))).await;
        assert_eq!(outcome, WorkOutcome::Missing);
        assert!(channel.calls().is_empty());
        assert!(h.tasks.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_code_fails_job_and_notifies() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Generate).await;
        let channel = FakeChannel::accepting("A", 4, "").with_description("Banned prompt");
        let worker = h.worker(channel);

        let outcome = worker.process_item(generate(job_id)).await;
        assert!(matches!(outcome, WorkOutcome::Rejected { ref reason } if reason.contains("Banned prompt")));

        let job = h.jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.progress, Progress::Failed);
        assert!(job.channel_id.is_none());
        assert!(job.error_message.unwrap().contains("Banned prompt"));

        let events = h.notifications.snapshot().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, NotifyKind::Failed);
        assert_eq!(events[0].job_id, job_id);
    }

    #[tokio::test]
    async fn test_transport_error_fails_job() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Blend).await;
        let worker = h.worker(FakeChannel::failing("A"));

        let item = WorkItem::new(
            job_id,
            1,
            TaskPayload::Blend {
                image_urls: vec!["a".into(), "b".into()],
            },
        );
        assert!(matches!(
            worker.process_item(item).await,
            WorkOutcome::Rejected { .. }
        ));
        assert_eq!(h.notifications.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_accepted_code_without_task_id_is_rejected() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Generate).await;
        let worker = h.worker(FakeChannel::accepting("A", 1, ""));

        assert!(matches!(
            worker.process_item(generate(job_id)).await,
            WorkOutcome::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_unbound_item_runs_anywhere() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Generate).await;
        let channel = FakeChannel::accepting("Z", 22, "task-9");
        let worker = h.worker(channel.clone());

        let outcome = worker.process_item(generate(job_id).with_channel("")).await;
        assert_eq!(
            outcome,
            WorkOutcome::Submitted {
                task_id: "task-9".into()
            }
        );
        assert_eq!(channel.calls(), vec!["generate".to_string()]);
    }

    mockall::mock! {
        Rewriter {}

        #[async_trait::async_trait]
        impl PromptRewriter for Rewriter {
            async fn rewrite(&self, text: &str, model: &str) -> ProviderResult<String>;
        }
    }

    fn worker_with_rewriter(h: &Harness, channel: FakeChannel, rewriter: MockRewriter) -> ChannelWorker {
        ChannelWorker::new(
            Arc::new(channel),
            WorkerDeps {
                tasks: h.tasks.clone(),
                notifications: h.notifications.clone(),
                jobs: h.jobs.clone(),
                rewriter: Arc::new(rewriter),
                accepted_codes: AcceptedCodes::default(),
                config: WorkerConfig::immediate(),
            },
        )
    }

    fn generate_prompt(job_id: JobId, prompt: &str) -> WorkItem {
        WorkItem::new(
            job_id,
            1,
            TaskPayload::Generate {
                prompt: prompt.into(),
                negative_prompt: String::new(),
                params: Default::default(),
                image_urls: vec![],
            },
        )
    }

    #[tokio::test]
    async fn test_non_latin_prompt_is_rewritten() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Generate).await;
        let channel = FakeChannel::accepting("A", 22, "task-1");

        let mut rewriter = MockRewriter::new();
        rewriter
            .expect_rewrite()
            .times(1)
            .returning(|_, _| Ok("a red fox".to_string()));
        let worker = worker_with_rewriter(&h, channel.clone(), rewriter);

        let outcome = worker.process_item(generate_prompt(job_id, "一只红狐狸")).await;
        assert!(matches!(outcome, WorkOutcome::Submitted { .. }));
        assert!(channel.prompts()[0].starts_with("a red fox"));
    }

    #[tokio::test]
    async fn test_latin_prompt_skips_rewrite() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Generate).await;
        let channel = FakeChannel::accepting("A", 1, "task-1");

        let mut rewriter = MockRewriter::new();
        rewriter.expect_rewrite().times(0);
        let worker = worker_with_rewriter(&h, channel.clone(), rewriter);

        worker.process_item(generate_prompt(job_id, "café au lait")).await;
        assert!(channel.prompts()[0].starts_with("café au lait"));
    }

    #[tokio::test]
    async fn test_rewrite_failure_keeps_original() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Generate).await;
        let channel = FakeChannel::accepting("A", 1, "task-1");

        let mut rewriter = MockRewriter::new();
        rewriter
            .expect_rewrite()
            .times(1)
            .returning(|_, _| Err(pixpool_provider::ProviderError::request("down")));
        let worker = worker_with_rewriter(&h, channel.clone(), rewriter);

        let outcome = worker.process_item(generate_prompt(job_id, "测试")).await;
        assert!(matches!(outcome, WorkOutcome::Submitted { .. }));
        assert!(channel.prompts()[0].starts_with("测试"));
    }

    #[tokio::test]
    async fn test_disabled_worker_does_not_pull() {
        let h = Harness::new();
        let job_id = h.job(JobKind::Generate).await;
        let channel = FakeChannel::accepting("A", 1, "task-1");
        let worker = Arc::new(h.worker(channel.clone()));
        worker.set_enabled(false);

        h.tasks.push(generate(job_id)).await.unwrap();
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&worker).run(stop_rx));

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        assert_eq!(h.tasks.len().await.unwrap(), 1);

        worker.set_enabled(true);
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert!(h.tasks.is_empty().await.unwrap());
        assert_eq!(channel.calls().len(), 1);

        stop.send(true).unwrap();
        handle.await.unwrap();
    }
}
