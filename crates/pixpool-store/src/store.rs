//! Persistence contracts consumed by the generation core.

use async_trait::async_trait;

use pixpool_models::{CreditLedgerEntry, Job, JobId, NewJob};

use crate::error::StoreResult;

/// Filter for job listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub user_id: Option<i64>,
    /// `Some(true)`: progress ≥ 100 (finished or failed), newest first.
    /// `Some(false)`: progress < 100, oldest first.
    /// `None`: all jobs, newest first.
    pub finished: Option<bool>,
    pub publish: Option<bool>,
    /// Only jobs that reached 100; failed jobs are excluded.
    pub completed_only: bool,
    /// 1-based page number; 0 disables paging
    pub page: u32,
    pub page_size: u32,
}

impl JobFilter {
    pub fn for_user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn finished(mut self, finished: bool) -> Self {
        self.finished = Some(finished);
        self
    }

    pub fn published(mut self, publish: bool) -> Self {
        self.publish = Some(publish);
        self
    }

    pub fn completed(mut self) -> Self {
        self.completed_only = true;
        self
    }

    pub fn paged(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// `(limit, offset)` when paging is enabled.
    pub fn window(&self) -> Option<(i64, i64)> {
        if self.page == 0 || self.page_size == 0 {
            return None;
        }
        let limit = i64::from(self.page_size);
        Some((limit, i64::from(self.page - 1) * limit))
    }

    /// Whether `job` passes the filter, ignoring paging.
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(user_id) = self.user_id {
            if job.user_id != user_id {
                return false;
            }
        }
        if let Some(publish) = self.publish {
            if job.publish != publish {
                return false;
            }
        }
        if let Some(finished) = self.finished {
            if (job.progress.to_db() >= 100) != finished {
                return false;
            }
        }
        if self.completed_only && !job.progress.is_finished() {
            return false;
        }
        true
    }
}

/// Persisted job records. The single source of truth for job state.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job and return it with its assigned id.
    async fn create(&self, job: NewJob) -> StoreResult<Job>;

    async fn get(&self, id: JobId) -> StoreResult<Option<Job>>;

    /// Write every mutable field of `job`.
    async fn update(&self, job: &Job) -> StoreResult<()>;

    /// Returns `true` if a row was removed.
    async fn delete(&self, id: JobId) -> StoreResult<bool>;

    async fn find_by_task_id(&self, task_id: &str) -> StoreResult<Option<Job>>;

    async fn list(&self, filter: &JobFilter) -> StoreResult<Vec<Job>>;

    /// Jobs accepted by a provider that are not finished or failed, oldest first.
    async fn list_in_flight(&self) -> StoreResult<Vec<Job>>;

    /// Returns `true` if the job exists.
    async fn set_publish(&self, id: JobId, publish: bool) -> StoreResult<bool>;
}

/// User credit balances with an append-only audit log.
///
/// Each mutation writes its [`CreditLedgerEntry`] atomically with the
/// balance change.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn balance(&self, user_id: i64) -> StoreResult<i64>;

    /// Fails with `InsufficientCredits` when the balance would go negative.
    async fn debit(
        &self,
        user_id: i64,
        amount: u32,
        model: &str,
        remark: &str,
    ) -> StoreResult<CreditLedgerEntry>;

    async fn credit(
        &self,
        user_id: i64,
        amount: u32,
        model: &str,
        remark: &str,
    ) -> StoreResult<CreditLedgerEntry>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixpool_models::{JobKind, Progress};

    fn job(user_id: i64, progress: Progress, publish: bool) -> Job {
        let mut job = Job::from_new(
            JobId(1),
            NewJob {
                kind: JobKind::Generate,
                user_id,
                prompt: "p".into(),
                reference_id: None,
                credit_cost: 1,
            },
        );
        job.progress = progress;
        job.publish = publish;
        job
    }

    #[test]
    fn test_failed_jobs_count_as_finished() {
        let filter = JobFilter::default().finished(true);
        assert!(filter.matches(&job(1, Progress::Failed, false)));
        assert!(filter.matches(&job(1, Progress::Percent(100), false)));
        assert!(!filter.matches(&job(1, Progress::Percent(99), false)));
    }

    #[test]
    fn test_user_and_publish_filters() {
        let filter = JobFilter::for_user(2).published(true);
        assert!(filter.matches(&job(2, Progress::Percent(0), true)));
        assert!(!filter.matches(&job(3, Progress::Percent(0), true)));
        assert!(!filter.matches(&job(2, Progress::Percent(0), false)));
    }

    #[test]
    fn test_window() {
        assert_eq!(JobFilter::default().window(), None);
        assert_eq!(JobFilter::default().paged(3, 20).window(), Some((20, 40)));
        assert_eq!(JobFilter::default().paged(1, 0).window(), None);
    }
}
