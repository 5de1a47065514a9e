//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "pixpool_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "pixpool_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "pixpool_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "pixpool_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "pixpool_ws_connections_active";
    pub const WS_MESSAGES_RECEIVED: &str = "pixpool_ws_messages_received_total";

    // Submission metrics
    pub const JOBS_ENQUEUED_TOTAL: &str = "pixpool_jobs_enqueued_total";
    pub const SUBMISSIONS_REJECTED_TOTAL: &str = "pixpool_submissions_rejected_total";
    pub const CREDITS_REFUNDED_TOTAL: &str = "pixpool_credits_refunded_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record WebSocket connection.
pub fn record_ws_connection(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::WS_CONNECTIONS_TOTAL, &labels).increment(1);
}

/// Update active WebSocket connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

pub fn record_ws_message_received(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::WS_MESSAGES_RECEIVED, &labels).increment(1);
}

/// Record job enqueued.
pub fn record_job_enqueued(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_ENQUEUED_TOTAL, &labels).increment(1);
}

/// `reason` is `credits`, `no_channel` or `enqueue`.
pub fn record_submission_rejected(job_type: &str, reason: &'static str) {
    let labels = [("type", job_type.to_string()), ("reason", reason.to_string())];
    counter!(names::SUBMISSIONS_REJECTED_TOTAL, &labels).increment(1);
}

pub fn record_refund(amount: u32) {
    counter!(names::CREDITS_REFUNDED_TOTAL).increment(u64::from(amount));
}

/// Sanitize path for metrics labels (numeric ids become `:id`).
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
