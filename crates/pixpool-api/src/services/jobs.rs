//! Job submission and management.
//!
//! Submission runs in a fixed order: pre-check, create the job, debit the
//! cost, push the work item. A failed debit deletes the job. A failed push
//! deletes the job and refunds the debit, so a synchronous failure never
//! leaves a charged job without a work item behind it.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use pixpool_models::{GenerateParams, Job, JobId, JobKind, JobView, NewJob, WsMessage};
use pixpool_queue::{ActionTarget, TaskPayload, WorkItem};
use pixpool_store::{CreditLedger, JobFilter, JobStore, StoreError};
use pixpool_worker::{ChannelPool, WorkerError};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Highest grid position an action can target.
const GRID_SIZE: u8 = 4;

/// Body of `POST /api/gen/image`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageTaskRequest {
    /// `generate` (or `image`), `blend`, `face_swap` (or `swapFace`)
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub neg_prompt: String,
    #[serde(default)]
    pub params: GenerateParams,
    /// Reference images; source images for blend and face swap
    #[serde(default)]
    pub img_arr: Vec<String>,
}

fn default_task_type() -> String {
    JobKind::Generate.as_str().to_string()
}

/// Body of `POST /api/gen/upscale` and `POST /api/gen/variation`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionTaskRequest {
    pub index: u8,
    /// Channel that produced the source image
    pub channel_id: String,
    pub message_id: String,
    pub message_hash: String,
}

/// Query of `GET /api/gen/jobs` and `GET /api/gen/gallery`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub finish: Option<bool>,
    pub publish: Option<bool>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

struct Submission {
    job: NewJob,
    payload: TaskPayload,
    channel_id: Option<String>,
}

/// Service for generation jobs owned by users.
#[derive(Clone)]
pub struct JobService {
    jobs: Arc<dyn JobStore>,
    ledger: Arc<dyn CreditLedger>,
    pool: Arc<ChannelPool>,
    generate_cost: u32,
    action_cost: u32,
    credit_model: String,
}

impl JobService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        ledger: Arc<dyn CreditLedger>,
        pool: Arc<ChannelPool>,
        config: &ApiConfig,
    ) -> Self {
        Self {
            jobs,
            ledger,
            pool,
            generate_cost: config.generate_cost,
            action_cost: config.action_cost,
            credit_model: config.credit_model.clone(),
        }
    }

    /// Submit a generate, blend or face swap task.
    pub async fn submit_image(&self, user_id: i64, request: ImageTaskRequest) -> ApiResult<JobView> {
        let kind: JobKind = request
            .task_type
            .parse()
            .map_err(|e: pixpool_models::ParseJobKindError| ApiError::bad_request(e.to_string()))?;

        let images: Vec<String> = request
            .img_arr
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();

        let (prompt, payload) = match kind {
            JobKind::Generate => {
                let prompt = request.prompt.trim();
                if prompt.is_empty() {
                    return Err(ApiError::bad_request("prompt is required"));
                }
                (
                    request.params.apply(prompt, !images.is_empty()),
                    TaskPayload::Generate {
                        prompt: prompt.to_string(),
                        negative_prompt: request.neg_prompt.trim().to_string(),
                        params: request.params,
                        image_urls: images,
                    },
                )
            }
            JobKind::Blend => {
                if images.len() < 2 {
                    return Err(ApiError::bad_request("blend needs at least two images"));
                }
                (image_list_prompt(kind, &images), TaskPayload::Blend { image_urls: images })
            }
            JobKind::FaceSwap => {
                if images.len() != 2 {
                    return Err(ApiError::bad_request("face swap needs exactly two images"));
                }
                (
                    image_list_prompt(kind, &images),
                    TaskPayload::FaceSwap { image_urls: images },
                )
            }
            JobKind::Upscale | JobKind::Variation => {
                return Err(ApiError::bad_request(format!(
                    "{} tasks are submitted through /api/gen/{}",
                    kind, kind
                )));
            }
        };

        self.precheck(user_id, kind, self.generate_cost).await?;

        self.enqueue(Submission {
            job: NewJob {
                kind,
                user_id,
                prompt,
                reference_id: None,
                credit_cost: self.generate_cost,
            },
            payload,
            channel_id: None,
        })
        .await
    }

    /// Submit an upscale or variation of one image of an earlier grid.
    ///
    /// The work item is bound to the channel that produced the source image.
    pub async fn submit_action(
        &self,
        user_id: i64,
        kind: JobKind,
        request: ActionTaskRequest,
    ) -> ApiResult<JobView> {
        if !kind.is_action() {
            return Err(ApiError::bad_request(format!("{} is not an action", kind)));
        }
        if !(1..=GRID_SIZE).contains(&request.index) {
            return Err(ApiError::bad_request(format!(
                "index must be between 1 and {}",
                GRID_SIZE
            )));
        }
        let channel_id = request.channel_id.trim();
        let message_id = request.message_id.trim();
        let message_hash = request.message_hash.trim();
        if channel_id.is_empty() || message_id.is_empty() || message_hash.is_empty() {
            return Err(ApiError::bad_request(
                "channel_id, message_id and message_hash are required",
            ));
        }

        self.precheck(user_id, kind, self.action_cost).await?;

        let target = ActionTarget {
            index: request.index,
            message_id: message_id.to_string(),
            message_hash: message_hash.to_string(),
        };
        let payload = match kind {
            JobKind::Upscale => TaskPayload::Upscale(target),
            _ => TaskPayload::Variation(target),
        };

        self.enqueue(Submission {
            job: NewJob {
                kind,
                user_id,
                prompt: String::new(),
                reference_id: Some(message_id.to_string()),
                credit_cost: self.action_cost,
            },
            payload,
            channel_id: Some(channel_id.to_string()),
        })
        .await
    }

    /// Delete one of the user's jobs.
    ///
    /// A job that never reached 100 gets its cost refunded. The refund is
    /// written before the delete, so a failed refund leaves the job in place
    /// and the removal can be retried.
    pub async fn remove(&self, user_id: i64, id: JobId) -> ApiResult<()> {
        let job = self.owned(user_id, id).await?;
        let refund = job.progress.to_db() != 100 && job.credit_cost > 0;

        if refund {
            let remark = format!(
                "{} task refund, job {}, error: {}",
                job.kind.label(),
                id,
                job.error_message.as_deref().unwrap_or("none")
            );
            self.ledger
                .credit(user_id, job.credit_cost, &self.credit_model, &remark)
                .await
                .map_err(|e| {
                    error!(job_id = %id, user_id, error = %e, "Failed to refund removed job");
                    e
                })?;
        }

        let deleted = self.jobs.delete(id).await;
        if !matches!(deleted, Ok(true)) {
            if refund {
                self.revoke_refund(&job).await;
            }
            return match deleted {
                Err(e) => Err(e.into()),
                _ => Err(ApiError::not_found(format!("job {}", id))),
            };
        }

        if refund {
            metrics::record_refund(job.credit_cost);
        }
        info!(job_id = %id, user_id, refunded = refund, "Job removed");

        self.nudge(user_id).await;
        Ok(())
    }

    /// Set or clear the gallery flag of one of the user's jobs.
    pub async fn publish(&self, user_id: i64, id: JobId, publish: bool) -> ApiResult<JobView> {
        let mut job = self.owned(user_id, id).await?;
        if publish && job.progress.is_failed() {
            return Err(ApiError::bad_request("failed jobs cannot be published"));
        }

        if !self.jobs.set_publish(id, publish).await? {
            return Err(ApiError::not_found(format!("job {}", id)));
        }
        job.publish = publish;
        Ok(JobView::from(&job))
    }

    pub async fn list(&self, user_id: i64, query: &ListQuery) -> ApiResult<Vec<JobView>> {
        let mut filter = JobFilter::for_user(user_id).paged(query.page, query.page_size);
        filter.finished = query.finish;
        filter.publish = query.publish;

        let jobs = self.jobs.list(&filter).await?;
        let mut views = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let mut view = JobView::from(job);
            if let Some(preview) = self.preview(job).await {
                view.img_url = Some(preview);
            }
            views.push(view);
        }
        Ok(views)
    }

    /// Published finished jobs of all users, newest first.
    pub async fn gallery(&self, query: &ListQuery) -> ApiResult<Vec<JobView>> {
        let filter = JobFilter::default()
            .finished(true)
            .completed()
            .published(true)
            .paged(query.page, query.page_size);

        let jobs = self.jobs.list(&filter).await?;
        Ok(jobs.iter().map(JobView::from).collect())
    }

    /// Inline the provider's in-progress image through the job's channel.
    async fn preview(&self, job: &Job) -> Option<String> {
        if job.progress.is_terminal() {
            return None;
        }
        let url = job.image_url.as_deref().filter(|u| !u.is_empty())?;
        let worker = self.pool.worker(job.channel_id.as_deref()?)?;
        match worker.channel().image_preview(url).await {
            Ok(preview) => Some(preview),
            Err(e) => {
                debug!(job_id = %job.id, error = %e, "Preview unavailable");
                None
            }
        }
    }

    async fn precheck(&self, user_id: i64, kind: JobKind, cost: u32) -> ApiResult<()> {
        let balance = self.ledger.balance(user_id).await?;
        if balance < i64::from(cost) {
            metrics::record_submission_rejected(kind.as_str(), "credits");
            return Err(ApiError::InsufficientCredits {
                balance,
                required: cost,
            });
        }

        if !self.pool.has_available_channel() {
            metrics::record_submission_rejected(kind.as_str(), "no_channel");
            return Err(ApiError::unavailable("no generation channel available"));
        }

        Ok(())
    }

    async fn enqueue(&self, submission: Submission) -> ApiResult<JobView> {
        let Submission {
            job: new_job,
            payload,
            channel_id,
        } = submission;
        let kind = new_job.kind;
        let user_id = new_job.user_id;
        let cost = new_job.credit_cost;

        let job = self.jobs.create(new_job).await?;

        let remark = format!("{} task, job {}", kind.label(), job.id);
        if let Err(e) = self
            .ledger
            .debit(user_id, cost, &self.credit_model, &remark)
            .await
        {
            self.discard(job.id).await;
            if matches!(e, StoreError::InsufficientCredits { .. }) {
                metrics::record_submission_rejected(kind.as_str(), "credits");
            }
            return Err(e.into());
        }

        let mut item = WorkItem::new(job.id, user_id, payload);
        if let Some(channel_id) = channel_id {
            item = item.with_channel(channel_id);
        }

        if let Err(e) = self.pool.push_task(item).await {
            warn!(job_id = %job.id, user_id, error = %e, "Failed to enqueue job");
            self.discard(job.id).await;

            let remark = format!("{} task refund, job {}, error: {}", kind.label(), job.id, e);
            if let Err(refund_err) = self
                .ledger
                .credit(user_id, cost, &self.credit_model, &remark)
                .await
            {
                error!(
                    job_id = %job.id,
                    user_id,
                    error = %refund_err,
                    "Failed to refund unqueued job"
                );
            } else {
                metrics::record_refund(cost);
            }

            let reason = match e {
                WorkerError::NoChannelAvailable => "no_channel",
                _ => "enqueue",
            };
            metrics::record_submission_rejected(kind.as_str(), reason);
            return Err(e.into());
        }

        metrics::record_job_enqueued(kind.as_str());
        info!(job_id = %job.id, user_id, kind = %kind, "Job enqueued");

        self.nudge(user_id).await;
        Ok(JobView::from(&job))
    }

    async fn owned(&self, user_id: i64, id: JobId) -> ApiResult<Job> {
        match self.jobs.get(id).await? {
            Some(job) if job.user_id == user_id => Ok(job),
            _ => Err(ApiError::not_found(format!("job {}", id))),
        }
    }

    /// Take back a refund whose job could not be deleted.
    async fn revoke_refund(&self, job: &Job) {
        let remark = format!("{} refund revoked, job {}", job.kind.label(), job.id);
        if let Err(e) = self
            .ledger
            .debit(job.user_id, job.credit_cost, &self.credit_model, &remark)
            .await
        {
            error!(job_id = %job.id, user_id = job.user_id, error = %e, "Failed to revoke refund");
        }
    }

    async fn discard(&self, id: JobId) {
        if let Err(e) = self.jobs.delete(id).await {
            error!(job_id = %id, error = %e, "Failed to delete rejected job");
        }
    }

    /// Tell the user's live connection to re-fetch its job list.
    async fn nudge(&self, user_id: i64) {
        self.pool
            .notify(user_id, WsMessage::TaskUpdated.to_json())
            .await;
    }
}

fn image_list_prompt(kind: JobKind, images: &[String]) -> String {
    format!("{}: {}", kind.label(), images.join(","))
}
