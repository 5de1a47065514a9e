//! Provider status callback.
//!
//! Providers that support it post task updates here. The body only names the
//! task; the status itself is re-queried through the owning channel.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pixpool_worker::ReconcileOutcome;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    #[serde(alias = "taskId")]
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    /// `unchanged`, `progressed`, `failed` or `unknown_task`
    pub result: &'static str,
}

pub async fn task_callback(
    State(state): State<AppState>,
    Json(request): Json<CallbackRequest>,
) -> ApiResult<Json<CallbackResponse>> {
    let task_id = request.id.trim();
    if task_id.is_empty() {
        return Err(ApiError::bad_request("task id is required"));
    }

    let outcome = state.sync.reconcile_task(task_id).await?;
    debug!(task_id, outcome = ?outcome, "Callback reconciled");

    let result = match outcome {
        None => "unknown_task",
        Some(ReconcileOutcome::Unchanged) => "unchanged",
        Some(ReconcileOutcome::Progressed(_)) => "progressed",
        Some(ReconcileOutcome::Failed { .. }) => "failed",
    };
    Ok(Json(CallbackResponse { result }))
}
