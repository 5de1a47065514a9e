//! Live push connections keyed by user.
//!
//! Each user has at most one registered connection. Registering a new one
//! supersedes the old, which is told to close. Sends are best effort: a
//! missing or broken connection is logged and never reported to the caller.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Frame delivered to a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    Text(String),
    /// The connection was superseded and should close.
    Close,
}

/// Handle to one live connection.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: Uuid,
    tx: mpsc::Sender<PushFrame>,
}

impl ClientHandle {
    pub fn new(tx: mpsc::Sender<PushFrame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn push(&self, frame: PushFrame) -> Result<(), mpsc::error::TrySendError<PushFrame>> {
        self.tx.try_send(frame)
    }
}

/// Maps user ids to their current connection.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<i64, ClientHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `user_id`, replacing and closing any previous one.
    pub async fn put(&self, user_id: i64, handle: ClientHandle) {
        let previous = self.clients.write().await.insert(user_id, handle);
        if let Some(previous) = previous {
            debug!(user_id, connection = %previous.id, "Superseding client connection");
            let _ = previous.push(PushFrame::Close);
        }
    }

    pub async fn get(&self, user_id: i64) -> Option<ClientHandle> {
        self.clients.read().await.get(&user_id).cloned()
    }

    /// Remove the mapping only if it still points at `connection_id`.
    pub async fn remove_if(&self, user_id: i64, connection_id: Uuid) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get(&user_id) {
            Some(handle) if handle.id == connection_id => {
                clients.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Best-effort send. Returns whether the payload was handed to the
    /// connection.
    pub async fn send(&self, user_id: i64, payload: impl Into<String>) -> bool {
        let Some(handle) = self.get(user_id).await else {
            debug!(user_id, "No client connection registered");
            return false;
        };

        match handle.push(PushFrame::Text(payload.into())) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user_id, connection = %handle.id, "Client send buffer full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(user_id, connection = %handle.id, "Client connection closed, removing");
                self.remove_if(user_id, handle.id).await;
                false
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_supersedes_previous_connection() {
        let registry = ClientRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let first = ClientHandle::new(tx1);
        let second = ClientHandle::new(tx2);
        let second_id = second.id();

        registry.put(1, first).await;
        registry.put(1, second).await;

        assert_eq!(registry.get(1).await.map(|h| h.id()), Some(second_id));
        assert_eq!(registry.len().await, 1);
        assert_eq!(rx1.recv().await, Some(PushFrame::Close));
    }

    #[tokio::test]
    async fn test_send_delivers_text() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.put(1, ClientHandle::new(tx)).await;

        assert!(registry.send(1, "hello").await);
        assert_eq!(rx.recv().await, Some(PushFrame::Text("hello".into())));
    }

    #[tokio::test]
    async fn test_send_without_connection_is_swallowed() {
        let registry = ClientRegistry::new();
        assert!(!registry.send(42, "hello").await);
    }

    #[tokio::test]
    async fn test_send_to_closed_connection_removes_it() {
        let registry = ClientRegistry::new();
        let (tx, rx) = mpsc::channel(4);
        registry.put(1, ClientHandle::new(tx)).await;
        drop(rx);

        assert!(!registry.send(1, "hello").await);
        assert!(registry.get(1).await.is_none());
    }

    #[tokio::test]
    async fn test_full_buffer_drops_message() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        registry.put(1, ClientHandle::new(tx)).await;

        assert!(registry.send(1, "first").await);
        assert!(!registry.send(1, "second").await);
        assert!(registry.get(1).await.is_some());
    }

    #[tokio::test]
    async fn test_remove_if_ignores_newer_connection() {
        let registry = ClientRegistry::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let old = ClientHandle::new(tx1);
        let old_id = old.id();

        registry.put(1, old).await;
        registry.put(1, ClientHandle::new(tx2)).await;

        assert!(!registry.remove_if(1, old_id).await);
        assert!(registry.get(1).await.is_some());
    }
}
