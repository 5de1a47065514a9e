//! In-process queue backend.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::error::QueueResult;
use crate::queue::PersistentQueue;

/// Non-durable FIFO with the same contract as the Redis backend.
pub struct MemoryQueue<T> {
    name: String,
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> MemoryQueue<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Copy of the waiting items, head first.
    pub async fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.lock().await.iter().cloned().collect()
    }
}

#[async_trait]
impl<T> PersistentQueue<T> for MemoryQueue<T>
where
    T: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, item: T) -> QueueResult<()> {
        self.items.lock().await.push_back(item);
        self.notify.notify_one();
        Ok(())
    }

    async fn pop_timeout(&self, timeout: Duration) -> QueueResult<Option<T>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.items.lock().await.pop_front() {
                return Ok(Some(item));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self) -> QueueResult<u64> {
        Ok(self.items.lock().await.len() as u64)
    }
}
