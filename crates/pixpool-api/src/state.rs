//! Application state.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use pixpool_provider::{
    AcceptedCodes, GenerationChannel, HttpChannel, OpenAiRewriter, PromptRewriter, ProviderConfig,
};
use pixpool_queue::{MemoryQueue, NotifyMessage, QueueBackend, QueueConfig, RedisQueue, WorkItem};
use pixpool_store::{
    connect, CreditLedger, JobStore, MemoryCreditLedger, MemoryJobStore, PgCreditLedger,
    PgJobStore, StoreConfig,
};
use pixpool_worker::{
    ChannelPool, ClientRegistry, NotificationDispatcher, NotifyQueue, ProgressSync,
    StatusReconciler, TaskQueue, WorkerConfig, WorkerDeps,
};

use crate::config::{ApiConfig, StoreBackend};
use crate::services::JobService;

/// Storage and transport backends the state is assembled from.
pub struct Backends {
    pub tasks: TaskQueue,
    pub notifications: NotifyQueue,
    pub jobs: Arc<dyn JobStore>,
    pub ledger: Arc<dyn CreditLedger>,
    pub rewriter: Arc<dyn PromptRewriter>,
    pub accepted_codes: AcceptedCodes,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: Arc<dyn JobStore>,
    pub ledger: Arc<dyn CreditLedger>,
    pub pool: Arc<ChannelPool>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub sync: Arc<ProgressSync>,
    pub job_service: JobService,
}

impl AppState {
    /// Create application state from environment configuration.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let queue_config = QueueConfig::from_env();
        let worker_config = WorkerConfig::from_env();
        let provider_config = ProviderConfig::from_env().context("invalid provider configuration")?;

        let (tasks, notifications): (TaskQueue, NotifyQueue) = match queue_config.backend {
            QueueBackend::Redis => (
                Arc::new(
                    RedisQueue::<WorkItem>::new(&queue_config.redis_url, &queue_config.task_queue)
                        .context("failed to create task queue")?,
                ),
                Arc::new(
                    RedisQueue::<NotifyMessage>::new(
                        &queue_config.redis_url,
                        &queue_config.notify_queue,
                    )
                    .context("failed to create notification queue")?,
                ),
            ),
            QueueBackend::Memory => {
                warn!("Using in-memory queues; pending work is lost on restart");
                (
                    Arc::new(MemoryQueue::<WorkItem>::new(&queue_config.task_queue)),
                    Arc::new(MemoryQueue::<NotifyMessage>::new(&queue_config.notify_queue)),
                )
            }
        };

        let (jobs, ledger): (Arc<dyn JobStore>, Arc<dyn CreditLedger>) =
            match config.store_backend {
                StoreBackend::Postgres => {
                    let pg = connect(&StoreConfig::from_env())
                        .await
                        .context("failed to connect to database")?;
                    (
                        Arc::new(PgJobStore::new(pg.clone())),
                        Arc::new(PgCreditLedger::new(pg)),
                    )
                }
                StoreBackend::Memory => {
                    warn!("Using in-memory stores; jobs and balances are lost on restart");
                    (
                        Arc::new(MemoryJobStore::new()),
                        Arc::new(MemoryCreditLedger::new()),
                    )
                }
            };

        let mut channels: Vec<Arc<dyn GenerationChannel>> = Vec::new();
        let mut disabled = Vec::new();
        for channel in &provider_config.channels {
            let http = HttpChannel::new(channel, provider_config.timeout)
                .with_context(|| format!("failed to create channel {}", channel.name))?;
            channels.push(Arc::new(http));
            if !channel.enabled {
                disabled.push(channel.name.clone());
            }
        }
        if channels.is_empty() {
            warn!("No generation channels configured; submissions will be rejected");
        }

        let rewriter = OpenAiRewriter::new(&provider_config.rewrite, provider_config.timeout)
            .context("failed to create prompt rewriter")?;

        let state = Self::with_backends(
            config,
            worker_config,
            channels,
            Backends {
                tasks,
                notifications,
                jobs,
                ledger,
                rewriter: Arc::new(rewriter),
                accepted_codes: provider_config.accepted_codes,
            },
        );

        for name in disabled {
            state.pool.set_channel_enabled(&name, false);
            info!(channel = %name, "Channel disabled by configuration");
        }

        Ok(state)
    }

    /// Assemble state over explicit backends.
    pub fn with_backends(
        config: ApiConfig,
        worker_config: WorkerConfig,
        channels: Vec<Arc<dyn GenerationChannel>>,
        backends: Backends,
    ) -> Self {
        let registry = Arc::new(ClientRegistry::new());

        let deps = WorkerDeps {
            tasks: backends.tasks,
            notifications: backends.notifications.clone(),
            jobs: backends.jobs.clone(),
            rewriter: backends.rewriter,
            accepted_codes: backends.accepted_codes,
            config: worker_config.clone(),
        };
        let pool = Arc::new(ChannelPool::new(channels, deps, Arc::clone(&registry)));

        let reconciler = Arc::new(StatusReconciler::new(
            pool.channels(),
            backends.jobs.clone(),
            backends.notifications.clone(),
        ));
        let sync = Arc::new(ProgressSync::new(
            backends.jobs.clone(),
            reconciler,
            backends.notifications.clone(),
            &worker_config,
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            backends.notifications,
            registry,
            worker_config,
        ));

        let job_service = JobService::new(
            backends.jobs.clone(),
            backends.ledger.clone(),
            Arc::clone(&pool),
            &config,
        );

        Self {
            config,
            jobs: backends.jobs,
            ledger: backends.ledger,
            pool,
            dispatcher,
            sync,
            job_service,
        }
    }

    /// Start the channel workers, the notification dispatcher and the
    /// progress sync. All of them stop on [`AppState::shutdown`].
    pub async fn start_background(&self) {
        self.pool.start().await;

        let dispatcher = Arc::clone(&self.dispatcher);
        let shutdown = self.pool.shutdown_receiver();
        tokio::spawn(async move {
            dispatcher.run(shutdown).await;
        });

        let sync = Arc::clone(&self.sync);
        let shutdown = self.pool.shutdown_receiver();
        tokio::spawn(async move {
            sync.run(shutdown).await;
        });

        info!(channels = ?self.pool.channel_names(), "Background tasks started");
    }

    pub async fn shutdown(&self) {
        self.pool.stop().await;
    }
}
