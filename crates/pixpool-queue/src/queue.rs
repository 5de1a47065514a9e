//! Persistent FIFO queues using Redis lists.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};

/// How long a worker blocks on one pop before re-checking its state.
pub const DEFAULT_POP_BLOCK: Duration = Duration::from_secs(1);

/// A durable FIFO shared by any number of producers and consumers.
///
/// `pop_timeout` returns `Ok(None)` when nothing usable arrived within the
/// window. Store failures are reported as errors, never as an empty item.
#[async_trait]
pub trait PersistentQueue<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Queue name, used in logs.
    fn name(&self) -> &str;

    /// Append to the tail. Durable before returning.
    async fn push(&self, item: T) -> QueueResult<()>;

    /// Remove the head, waiting up to `timeout` for one to arrive.
    async fn pop_timeout(&self, timeout: Duration) -> QueueResult<Option<T>>;

    /// Number of items waiting.
    async fn len(&self) -> QueueResult<u64>;

    /// Remove the head, waiting as long as it takes.
    async fn pop_blocking(&self) -> QueueResult<T> {
        loop {
            if let Some(item) = self.pop_timeout(DEFAULT_POP_BLOCK).await? {
                return Ok(item);
            }
        }
    }

    async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Which queue implementation to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Redis,
    /// In-process, non-durable. Single-process development and tests.
    Memory,
}

impl QueueBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Some(QueueBackend::Redis),
            "memory" => Some(QueueBackend::Memory),
            _ => None,
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// List holding inbound work items
    pub task_queue: String,
    /// List holding outbound notification events
    pub notify_queue: String,
    pub backend: QueueBackend,
    /// Block duration of a single worker pop
    pub pop_block: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            task_queue: "pixpool:task_queue".to_string(),
            notify_queue: "pixpool:notify_queue".to_string(),
            backend: QueueBackend::Redis,
            pop_block: DEFAULT_POP_BLOCK,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            task_queue: std::env::var("TASK_QUEUE_NAME")
                .unwrap_or_else(|_| "pixpool:task_queue".to_string()),
            notify_queue: std::env::var("NOTIFY_QUEUE_NAME")
                .unwrap_or_else(|_| "pixpool:notify_queue".to_string()),
            backend: std::env::var("QUEUE_BACKEND")
                .ok()
                .and_then(|s| QueueBackend::parse(&s))
                .unwrap_or(QueueBackend::Redis),
            pop_block: Duration::from_millis(
                std::env::var("QUEUE_POP_BLOCK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
        }
    }
}

/// Queue stored as one Redis list. Items are JSON strings.
pub struct RedisQueue<T> {
    client: redis::Client,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RedisQueue<T> {
    /// Create a queue over the list `name`.
    pub fn new(redis_url: &str, name: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::with_client(client, name))
    }

    /// Create a queue sharing an existing client.
    pub fn with_client(client: redis::Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            _marker: PhantomData,
        }
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(format!("{}: {}", self.name, e)))
    }
}

#[async_trait]
impl<T> PersistentQueue<T> for RedisQueue<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, item: T) -> QueueResult<()> {
        let payload = serde_json::to_string(&item)?;
        let mut conn = self.connection().await?;

        conn.rpush::<_, _, ()>(&self.name, payload)
            .await
            .map_err(|e| QueueError::push_failed(format!("{}: {}", self.name, e)))?;

        debug!(queue = %self.name, "Pushed item");
        Ok(())
    }

    async fn pop_timeout(&self, timeout: Duration) -> QueueResult<Option<T>> {
        let mut conn = self.connection().await?;

        // BLPOP takes fractional seconds; 0 would block forever.
        let secs = timeout.as_secs_f64().max(0.01);
        let reply: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(&self.name)
            .arg(secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::pop_failed(format!("{}: {}", self.name, e)))?;

        let Some((_, payload)) = reply else {
            return Ok(None);
        };

        match serde_json::from_str::<T>(&payload) {
            Ok(item) => Ok(Some(item)),
            Err(e) => {
                warn!(queue = %self.name, error = %e, "Discarding malformed queue payload");
                Ok(None)
            }
        }
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.llen(&self.name).await?;
        Ok(len)
    }
}
