//! PostgreSQL store backends.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, FromRow};
use tracing::{debug, info};

use pixpool_models::{
    CreditDirection, CreditLedgerEntry, Job, JobId, JobKind, NewJob, Progress,
    FAILED_PROGRESS,
};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::{CreditLedger, JobFilter, JobStore};

/// Column list for gen_jobs queries.
const JOB_COLUMNS: &str = "id, kind, user_id, task_id, channel_id, reference_id, progress, \
    prompt, image_url, hash, error_message, credit_cost, publish, created_at, updated_at";

/// Connect, and apply the bundled schema when configured to.
pub async fn connect(config: &StoreConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    if config.apply_schema {
        (&pool).execute(include_str!("schema.sql")).await?;
        info!("Database schema applied");
    }

    Ok(pool)
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: i64,
    kind: String,
    user_id: i64,
    task_id: Option<String>,
    channel_id: Option<String>,
    reference_id: Option<String>,
    progress: i16,
    prompt: String,
    image_url: Option<String>,
    hash: Option<String>,
    error_message: Option<String>,
    credit_cost: i32,
    publish: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let kind = JobKind::from_str(&row.kind)
            .map_err(|e| StoreError::invalid_row(format!("job {}: {}", row.id, e)))?;
        Ok(Job {
            id: JobId(row.id),
            kind,
            user_id: row.user_id,
            task_id: row.task_id,
            channel_id: row.channel_id,
            reference_id: row.reference_id,
            progress: Progress::from_db(row.progress),
            prompt: row.prompt,
            image_url: row.image_url,
            hash: row.hash,
            error_message: row.error_message,
            credit_cost: row.credit_cost.max(0) as u32,
            publish: row.publish,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_jobs(rows: Vec<JobRow>) -> StoreResult<Vec<Job>> {
    rows.into_iter().map(Job::try_from).collect()
}

/// Job store over the `gen_jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: Arc<PgPool>,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new: NewJob) -> StoreResult<Job> {
        let query = format!(
            "INSERT INTO gen_jobs (kind, user_id, reference_id, prompt, credit_cost) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(new.kind.as_str())
            .bind(new.user_id)
            .bind(&new.reference_id)
            .bind(&new.prompt)
            .bind(new.credit_cost as i32)
            .fetch_one(&*self.pool)
            .await?;
        debug!(job_id = row.id, "Created job");
        row.try_into()
    }

    async fn get(&self, id: JobId) -> StoreResult<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM gen_jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id.as_i64())
            .fetch_optional(&*self.pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn update(&self, job: &Job) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE gen_jobs SET \
                task_id = $2, channel_id = $3, reference_id = $4, progress = $5, \
                prompt = $6, image_url = $7, hash = $8, error_message = $9, \
                credit_cost = $10, publish = $11, updated_at = now() \
             WHERE id = $1 AND progress <> $12",
        )
        .bind(job.id.as_i64())
        .bind(&job.task_id)
        .bind(&job.channel_id)
        .bind(&job.reference_id)
        .bind(job.progress.to_db())
        .bind(&job.prompt)
        .bind(&job.image_url)
        .bind(&job.hash)
        .bind(&job.error_message)
        .bind(job.credit_cost as i32)
        .bind(job.publish)
        .bind(FAILED_PROGRESS)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM gen_jobs WHERE id = $1)")
                    .bind(job.id.as_i64())
                    .fetch_one(&*self.pool)
                    .await?;
            return Err(if exists {
                StoreError::already_failed(job.id.to_string())
            } else {
                StoreError::not_found(format!("job {}", job.id))
            });
        }
        Ok(())
    }

    async fn delete(&self, id: JobId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM gen_jobs WHERE id = $1")
            .bind(id.as_i64())
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_task_id(&self, task_id: &str) -> StoreResult<Option<Job>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM gen_jobs WHERE task_id = $1 ORDER BY id DESC LIMIT 1"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(task_id)
            .fetch_optional(&*self.pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn list(&self, filter: &JobFilter) -> StoreResult<Vec<Job>> {
        let (progress_clause, order) = match filter.finished {
            Some(true) => ("AND progress >= 100", "DESC"),
            Some(false) => ("AND progress < 100", "ASC"),
            None => ("", "DESC"),
        };
        let completed_clause = if filter.completed_only {
            "AND progress = 100"
        } else {
            ""
        };
        let (limit, offset) = filter.window().unwrap_or((i64::MAX, 0));

        let query = format!(
            "SELECT {JOB_COLUMNS} FROM gen_jobs \
             WHERE ($1::BIGINT IS NULL OR user_id = $1) \
               AND ($2::BOOLEAN IS NULL OR publish = $2) \
               {progress_clause} {completed_clause} \
             ORDER BY id {order} \
             LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(filter.user_id)
            .bind(filter.publish)
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await?;
        into_jobs(rows)
    }

    async fn list_in_flight(&self) -> StoreResult<Vec<Job>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM gen_jobs \
             WHERE task_id IS NOT NULL AND progress < 100 \
             ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .fetch_all(&*self.pool)
            .await?;
        into_jobs(rows)
    }

    async fn set_publish(&self, id: JobId, publish: bool) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE gen_jobs SET publish = $2, updated_at = now() WHERE id = $1")
                .bind(id.as_i64())
                .bind(publish)
                .execute(&*self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Credit ledger over the `users` and `credit_logs` tables.
#[derive(Clone)]
pub struct PgCreditLedger {
    pool: Arc<PgPool>,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn insert_log(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        entry: &CreditLedgerEntry,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO credit_logs (user_id, amount, balance, direction, model, remark, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.user_id)
        .bind(entry.amount as i32)
        .bind(entry.balance_after)
        .bind(entry.direction.as_str())
        .bind(&entry.model)
        .bind(&entry.remark)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn balance(&self, user_id: i64) -> StoreResult<i64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT power FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(|(power,)| power)
            .ok_or(StoreError::UserNotFound(user_id))
    }

    async fn debit(
        &self,
        user_id: i64,
        amount: u32,
        model: &str,
        remark: &str,
    ) -> StoreResult<CreditLedgerEntry> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<(i64,)> = sqlx::query_as(
            "UPDATE users SET power = power - $2 WHERE id = $1 AND power >= $2 RETURNING power",
        )
        .bind(user_id)
        .bind(i64::from(amount))
        .fetch_optional(&mut *tx)
        .await?;

        let balance_after = match updated {
            Some((power,)) => power,
            None => {
                let current: Option<(i64,)> =
                    sqlx::query_as("SELECT power FROM users WHERE id = $1")
                        .bind(user_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                tx.rollback().await?;
                return Err(match current {
                    Some((balance,)) => StoreError::InsufficientCredits {
                        user_id,
                        balance,
                        required: amount,
                    },
                    None => StoreError::UserNotFound(user_id),
                });
            }
        };

        let entry = CreditLedgerEntry::new(
            user_id,
            amount,
            balance_after,
            CreditDirection::Debit,
            model,
            remark,
        );
        Self::insert_log(&mut tx, &entry).await?;
        tx.commit().await?;

        debug!(user_id, amount, balance_after, "Debited credits");
        Ok(entry)
    }

    async fn credit(
        &self,
        user_id: i64,
        amount: u32,
        model: &str,
        remark: &str,
    ) -> StoreResult<CreditLedgerEntry> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<(i64,)> =
            sqlx::query_as("UPDATE users SET power = power + $2 WHERE id = $1 RETURNING power")
                .bind(user_id)
                .bind(i64::from(amount))
                .fetch_optional(&mut *tx)
                .await?;

        let Some((balance_after,)) = updated else {
            tx.rollback().await?;
            return Err(StoreError::UserNotFound(user_id));
        };

        let entry = CreditLedgerEntry::new(
            user_id,
            amount,
            balance_after,
            CreditDirection::Credit,
            model,
            remark,
        );
        Self::insert_log(&mut tx, &entry).await?;
        tx.commit().await?;

        debug!(user_id, amount, balance_after, "Credited credits");
        Ok(entry)
    }
}
