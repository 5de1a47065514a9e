//! Channel worker pool for pixpool.
//!
//! This crate provides:
//! - [`ChannelWorker`] and [`ChannelPool`]: one worker per generation
//!   channel, sharing a single inbound queue with channel affinity
//! - [`StatusReconciler`] and [`ProgressSync`]: merge provider status into
//!   stored jobs and publish state-change events
//! - [`NotificationDispatcher`] and [`ClientRegistry`]: deliver events to
//!   live client connections

use std::sync::Arc;

use pixpool_queue::{NotifyMessage, PersistentQueue, WorkItem};

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod reconciler;
pub mod registry;
pub mod retry;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::WorkerConfig;
pub use dispatcher::NotificationDispatcher;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pool::ChannelPool;
pub use reconciler::{ReconcileOutcome, StatusReconciler};
pub use registry::{ClientHandle, ClientRegistry, PushFrame};
pub use retry::{retry_async, FailureTracker, RetryPolicy};
pub use sync::{ProgressSync, SyncReport};
pub use worker::{ChannelWorker, WorkOutcome, WorkerDeps};

/// Shared inbound work queue.
pub type TaskQueue = Arc<dyn PersistentQueue<WorkItem>>;

/// Shared notification queue.
pub type NotifyQueue = Arc<dyn PersistentQueue<NotifyMessage>>;
