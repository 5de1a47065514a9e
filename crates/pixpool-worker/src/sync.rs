//! Periodic progress sync for in-flight jobs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use pixpool_models::{Job, JobId};
use pixpool_queue::NotifyMessage;
use pixpool_store::{JobStore, StoreError};

use crate::config::WorkerConfig;
use crate::dispatcher::publish_event;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::reconciler::{ReconcileOutcome, StatusReconciler};
use crate::NotifyQueue;

/// Counts from one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub reconciled: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub errors: usize,
}

/// Polls providers for every in-flight job and fails jobs that ran too long.
pub struct ProgressSync {
    jobs: Arc<dyn JobStore>,
    reconciler: Arc<StatusReconciler>,
    notifications: NotifyQueue,
    interval: Duration,
    job_timeout: Duration,
    in_progress: Mutex<HashSet<JobId>>,
}

impl ProgressSync {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        reconciler: Arc<StatusReconciler>,
        notifications: NotifyQueue,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            reconciler,
            notifications,
            interval: config.sync_interval,
            job_timeout: config.job_timeout,
            in_progress: Mutex::new(HashSet::new()),
        }
    }

    /// Run sync passes until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.job_timeout.as_secs(),
            "Starting progress sync"
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sync_once().await {
                        Ok(report) if report != SyncReport::default() => {
                            debug!(?report, "Progress sync pass complete");
                        }
                        Ok(_) => {}
                        Err(e) => error!("Progress sync failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Progress sync stopped");
    }

    /// One pass over all in-flight jobs.
    pub async fn sync_once(&self) -> WorkerResult<SyncReport> {
        let jobs = self.jobs.list_in_flight().await?;
        let mut report = SyncReport::default();

        for job in jobs {
            if self.is_timed_out(&job) {
                match self.fail_timed_out(job.id).await {
                    Ok(true) => report.timed_out += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Failed to time out job: {}", e);
                        report.errors += 1;
                    }
                }
                continue;
            }

            match self.reconcile_job(job).await {
                Ok(Some(ReconcileOutcome::Failed { .. })) => report.failed += 1,
                Ok(Some(_)) => report.reconciled += 1,
                Ok(None) => {}
                Err(e) => {
                    debug!("Reconcile failed: {}", e);
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Reconcile the job bound to `task_id`, e.g. from a provider callback.
    pub async fn reconcile_task(&self, task_id: &str) -> WorkerResult<Option<ReconcileOutcome>> {
        let Some(job) = self.jobs.find_by_task_id(task_id).await? else {
            return Ok(None);
        };
        self.reconcile_job(job).await
    }

    /// Reconcile by id. Returns `JobNotFound` for unknown ids.
    pub async fn reconcile_id(&self, job_id: JobId) -> WorkerResult<Option<ReconcileOutcome>> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(WorkerError::JobNotFound(job_id))?;
        self.reconcile_job(job).await
    }

    /// Returns `None` when another reconcile of the same job is running.
    async fn reconcile_job(&self, job: Job) -> WorkerResult<Option<ReconcileOutcome>> {
        let job_id = job.id;
        if !self.claim(job_id).await {
            return Ok(None);
        }

        let result = self.reconcile_current(job_id).await;
        self.in_progress.lock().await.remove(&job_id);
        result
    }

    /// Reconcile the stored row, not the caller's possibly older copy.
    async fn reconcile_current(&self, job_id: JobId) -> WorkerResult<Option<ReconcileOutcome>> {
        let Some(mut job) = self.jobs.get(job_id).await? else {
            return Ok(None);
        };
        self.reconciler.reconcile(&mut job).await.map(Some)
    }

    /// Mark `job_id` as being mutated. False when someone else holds it.
    async fn claim(&self, job_id: JobId) -> bool {
        let claimed = self.in_progress.lock().await.insert(job_id);
        if !claimed {
            debug!(job_id = %job_id, "Job is being reconciled, skipping");
        }
        claimed
    }

    fn is_timed_out(&self, job: &Job) -> bool {
        let age = Utc::now().signed_duration_since(job.created_at);
        age.to_std().map(|age| age > self.job_timeout).unwrap_or(false)
    }

    async fn fail_timed_out(&self, job_id: JobId) -> WorkerResult<bool> {
        if !self.claim(job_id).await {
            return Ok(false);
        }
        let result = self.write_timeout(job_id).await;
        self.in_progress.lock().await.remove(&job_id);
        result
    }

    async fn write_timeout(&self, job_id: JobId) -> WorkerResult<bool> {
        let Some(mut job) = self.jobs.get(job_id).await? else {
            return Ok(false);
        };
        if job.progress.is_terminal() {
            return Ok(false);
        }
        let reason = format!(
            "Task timed out after {} seconds",
            self.job_timeout.as_secs()
        );
        if !job.fail(reason) {
            return Ok(false);
        }
        match self.jobs.update(&job).await {
            Ok(()) => {}
            Err(StoreError::AlreadyFailed(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        warn!(job_id = %job.id, task_id = ?job.task_id, "Job timed out");
        publish_event(&self.notifications, NotifyMessage::failed(job.user_id, job.id)).await;
        metrics::record_failed(job.kind.as_str(), "timeout");
        Ok(true)
    }
}
