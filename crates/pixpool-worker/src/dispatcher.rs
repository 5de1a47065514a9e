//! Notification publishing and delivery.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use pixpool_models::WsMessage;
use pixpool_queue::NotifyMessage;

use crate::config::WorkerConfig;
use crate::metrics;
use crate::registry::ClientRegistry;
use crate::retry::{retry_async, FailureTracker, RetryPolicy};
use crate::NotifyQueue;

/// Push a state-change event onto the notification queue.
///
/// Retries briefly; a final failure is logged and dropped, since live
/// notifications are best effort and clients re-poll on reconnect.
pub(crate) async fn publish_event(queue: &NotifyQueue, event: NotifyMessage) -> bool {
    let policy = RetryPolicy::default();
    let job_id = event.job_id;
    match retry_async(&policy, "notify_push", || queue.push(event.clone())).await {
        Ok(()) => true,
        Err(e) => {
            error!(job_id = %job_id, "Failed to publish notification: {}", e);
            false
        }
    }
}

/// Drains the notification queue into live client connections.
pub struct NotificationDispatcher {
    queue: NotifyQueue,
    registry: Arc<ClientRegistry>,
    config: WorkerConfig,
}

impl NotificationDispatcher {
    pub fn new(queue: NotifyQueue, registry: Arc<ClientRegistry>, config: WorkerConfig) -> Self {
        Self {
            queue,
            registry,
            config,
        }
    }

    /// Deliver one event. Returns whether it reached a connection.
    pub async fn dispatch(&self, event: &NotifyMessage) -> bool {
        let payload = WsMessage::job_status(event.job_id, event.message).to_json();
        let delivered = self.registry.send(event.user_id, payload).await;
        metrics::record_notification(delivered);
        debug!(
            user_id = event.user_id,
            job_id = %event.job_id,
            status = %event.message,
            delivered,
            "Dispatched notification"
        );
        delivered
    }

    /// Run until shutdown is signalled.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(queue = self.queue.name(), "Starting notification dispatcher");
        let mut failures = FailureTracker::new(3);

        while !*shutdown.borrow() {
            match self.queue.pop_timeout(self.config.pop_block).await {
                Ok(Some(event)) => {
                    failures.record_success();
                    self.dispatch(&event).await;
                }
                Ok(None) => failures.record_success(),
                Err(e) => {
                    metrics::record_pop_error(self.queue.name());
                    if failures.record_failure() {
                        error!(queue = self.queue.name(), "Failed to pop notification: {}", e);
                    }
                    tokio::time::sleep(self.config.pop_error_backoff).await;
                }
            }
        }

        info!("Notification dispatcher stopped");
    }
}
