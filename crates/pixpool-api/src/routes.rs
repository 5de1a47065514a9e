//! API routes.

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    gallery, health, list_jobs, publish_job, remove_job, submit_image, submit_upscale,
    submit_variation, task_callback,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;
use crate::ws::ws_client;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let gen_routes = Router::new()
        // Submission
        .route("/gen/image", post(submit_image))
        .route("/gen/upscale", post(submit_upscale))
        .route("/gen/variation", post(submit_variation))
        // Job management
        .route("/gen/jobs", get(list_jobs))
        .route("/gen/jobs/:id", delete(remove_job))
        .route("/gen/jobs/:id/publish", post(publish_job))
        .route("/gen/gallery", get(gallery))
        // Provider callback
        .route("/gen/callback", post(task_callback))
        // Live connection
        .route("/gen/client", get(ws_client));

    let health_routes = Router::new().route("/health", get(health));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", gen_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
