//! In-memory store backends.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use pixpool_models::{CreditDirection, CreditLedgerEntry, Job, JobId, NewJob};

use crate::error::{StoreError, StoreResult};
use crate::store::{CreditLedger, JobFilter, JobStore};

/// Job store held in a map keyed by id.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<BTreeMap<JobId, Job>>,
    next_id: AtomicI64,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed job, keeping its id.
    pub async fn insert(&self, job: Job) {
        self.next_id.fetch_max(job.id.as_i64(), Ordering::SeqCst);
        self.jobs.write().await.insert(job.id, job);
    }

    pub async fn count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new: NewJob) -> StoreResult<Job> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let job = Job::from_new(id, new);
        self.jobs.write().await.insert(id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, job: &Job) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) if existing.progress.is_failed() => {
                Err(StoreError::already_failed(job.id.to_string()))
            }
            Some(existing) => {
                *existing = job.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::not_found(format!("job {}", job.id))),
        }
    }

    async fn delete(&self, id: JobId) -> StoreResult<bool> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }

    async fn find_by_task_id(&self, task_id: &str) -> StoreResult<Option<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .find(|job| job.task_id.as_deref() == Some(task_id))
            .cloned())
    }

    async fn list(&self, filter: &JobFilter) -> StoreResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let matching = jobs.values().filter(|job| filter.matches(job)).cloned();

        // Map iteration is ascending by id.
        let mut out: Vec<Job> = if filter.finished == Some(false) {
            matching.collect()
        } else {
            matching.rev().collect()
        };

        if let Some((limit, offset)) = filter.window() {
            out = out
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
        }
        Ok(out)
    }

    async fn list_in_flight(&self) -> StoreResult<Vec<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.is_in_flight())
            .cloned()
            .collect())
    }

    async fn set_publish(&self, id: JobId, publish: bool) -> StoreResult<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) => {
                job.publish = publish;
                job.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Credit ledger held in memory. Users must be seeded with [`set_balance`].
///
/// [`set_balance`]: MemoryCreditLedger::set_balance
#[derive(Default)]
pub struct MemoryCreditLedger {
    inner: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<i64, i64>,
    entries: Vec<CreditLedgerEntry>,
}

impl MemoryCreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_balance(&self, user_id: i64, balance: i64) {
        self.inner.lock().await.balances.insert(user_id, balance);
    }

    /// All audit entries, oldest first.
    pub async fn entries(&self) -> Vec<CreditLedgerEntry> {
        self.inner.lock().await.entries.clone()
    }
}

#[async_trait]
impl CreditLedger for MemoryCreditLedger {
    async fn balance(&self, user_id: i64) -> StoreResult<i64> {
        self.inner
            .lock()
            .await
            .balances
            .get(&user_id)
            .copied()
            .ok_or(StoreError::UserNotFound(user_id))
    }

    async fn debit(
        &self,
        user_id: i64,
        amount: u32,
        model: &str,
        remark: &str,
    ) -> StoreResult<CreditLedgerEntry> {
        let mut state = self.inner.lock().await;
        let balance = state
            .balances
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound(user_id))?;

        if *balance < i64::from(amount) {
            return Err(StoreError::InsufficientCredits {
                user_id,
                balance: *balance,
                required: amount,
            });
        }
        *balance -= i64::from(amount);

        let entry = CreditLedgerEntry::new(
            user_id,
            amount,
            *balance,
            CreditDirection::Debit,
            model,
            remark,
        );
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn credit(
        &self,
        user_id: i64,
        amount: u32,
        model: &str,
        remark: &str,
    ) -> StoreResult<CreditLedgerEntry> {
        let mut state = self.inner.lock().await;
        let balance = state
            .balances
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound(user_id))?;
        *balance += i64::from(amount);

        let entry = CreditLedgerEntry::new(
            user_id,
            amount,
            *balance,
            CreditDirection::Credit,
            model,
            remark,
        );
        state.entries.push(entry.clone());
        Ok(entry)
    }
}
