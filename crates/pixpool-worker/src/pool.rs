//! Channel worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use pixpool_provider::GenerationChannel;
use pixpool_queue::WorkItem;

use crate::error::{WorkerError, WorkerResult};
use crate::registry::{ClientHandle, ClientRegistry};
use crate::worker::{ChannelWorker, WorkerDeps};
use crate::TaskQueue;

/// One worker per channel over a shared inbound queue, plus the registry of
/// live client connections.
pub struct ChannelPool {
    workers: Vec<Arc<ChannelWorker>>,
    tasks: TaskQueue,
    registry: Arc<ClientRegistry>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ChannelPool {
    /// Build a pool over `channels`. Channel names must be unique.
    pub fn new(
        channels: Vec<Arc<dyn GenerationChannel>>,
        deps: WorkerDeps,
        registry: Arc<ClientRegistry>,
    ) -> Self {
        let tasks = deps.tasks.clone();
        let workers = channels
            .into_iter()
            .map(|channel| Arc::new(ChannelWorker::new(channel, deps.clone())))
            .collect();
        let (shutdown, _) = watch::channel(false);

        Self {
            workers,
            tasks,
            registry,
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one task per worker.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for worker in &self.workers {
            let rx = self.shutdown.subscribe();
            handles.push(tokio::spawn(Arc::clone(worker).run(rx)));
        }
        info!(workers = self.workers.len(), "Channel pool started");
    }

    /// Signal shutdown and wait for in-progress items to finish.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Channel worker ended abnormally: {}", e);
            }
        }
        info!("Channel pool stopped");
    }

    /// Receiver that flips to `true` when the pool stops.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn has_available_channel(&self) -> bool {
        self.workers.iter().any(|w| w.is_enabled())
    }

    /// Returns `false` for unknown channel names.
    pub fn set_channel_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.worker(name) {
            Some(worker) => {
                worker.set_enabled(enabled);
                info!(channel = name, enabled, "Channel availability changed");
                true
            }
            None => false,
        }
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name().to_string()).collect()
    }

    pub fn worker(&self, name: &str) -> Option<&Arc<ChannelWorker>> {
        self.workers.iter().find(|w| w.name() == name)
    }

    /// Channels by name, for status reconciliation.
    pub fn channels(&self) -> HashMap<String, Arc<dyn GenerationChannel>> {
        self.workers
            .iter()
            .map(|w| (w.name().to_string(), Arc::clone(w.channel())))
            .collect()
    }

    /// Enqueue a work item for the next free worker.
    pub async fn push_task(&self, item: WorkItem) -> WorkerResult<()> {
        if !self.has_available_channel() {
            return Err(WorkerError::NoChannelAvailable);
        }
        self.tasks.push(item).await?;
        Ok(())
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub async fn register_connection(&self, user_id: i64, handle: ClientHandle) {
        self.registry.put(user_id, handle).await;
    }

    pub async fn lookup_connection(&self, user_id: i64) -> Option<ClientHandle> {
        self.registry.get(user_id).await
    }

    /// Best-effort push to the user's live connection.
    pub async fn notify(&self, user_id: i64, payload: impl Into<String>) -> bool {
        self.registry.send(user_id, payload).await
    }
}
