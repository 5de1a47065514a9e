//! Generation job handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use pixpool_models::{JobId, JobKind, JobView};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::services::{ActionTaskRequest, ImageTaskRequest, ListQuery};
use crate::state::AppState;

/// Job listing response.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub items: Vec<JobView>,
    pub page: u32,
    pub page_size: u32,
}

impl JobListResponse {
    fn new(items: Vec<JobView>, query: &ListQuery) -> Self {
        Self {
            items,
            page: query.page,
            page_size: query.page_size,
        }
    }
}

/// Publish toggle body.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(default = "default_publish")]
    pub publish: bool,
}

fn default_publish() -> bool {
    true
}

/// Submit a generate, blend or face swap task.
pub async fn submit_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ImageTaskRequest>,
) -> ApiResult<(StatusCode, Json<JobView>)> {
    let view = state.job_service.submit_image(user.id, request).await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

/// Upscale one image of an earlier grid.
pub async fn submit_upscale(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ActionTaskRequest>,
) -> ApiResult<(StatusCode, Json<JobView>)> {
    let view = state
        .job_service
        .submit_action(user.id, JobKind::Upscale, request)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

/// Produce variations of one image of an earlier grid.
pub async fn submit_variation(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ActionTaskRequest>,
) -> ApiResult<(StatusCode, Json<JobView>)> {
    let view = state
        .job_service
        .submit_action(user.id, JobKind::Variation, request)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<JobListResponse>> {
    let items = state.job_service.list(user.id, &query).await?;
    Ok(Json(JobListResponse::new(items, &query)))
}

/// Published finished jobs of all users.
pub async fn gallery(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<JobListResponse>> {
    let items = state.job_service.gallery(&query).await?;
    Ok(Json(JobListResponse::new(items, &query)))
}

pub async fn remove_job(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.job_service.remove(user.id, JobId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn publish_job(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<PublishRequest>,
) -> ApiResult<Json<JobView>> {
    let view = state
        .job_service
        .publish(user.id, JobId(id), request.publish)
        .await?;
    Ok(Json(view))
}
