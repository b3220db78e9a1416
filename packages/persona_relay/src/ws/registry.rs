use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::error::RelayError;
use crate::protocol::ServerMessage;

pub const DEFAULT_SEND_CHANNEL_CAPACITY: usize = 100;
pub const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 32;
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Per-connection buffering limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Outbound frames queued ahead of the writer
    pub send_channel_capacity: usize,
    /// Inbound messages waiting behind the relay in progress
    pub inbound_queue_capacity: usize,
    /// Largest inbound WebSocket message accepted
    pub max_message_bytes: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            send_channel_capacity: DEFAULT_SEND_CHANNEL_CAPACITY,
            inbound_queue_capacity: DEFAULT_INBOUND_QUEUE_CAPACITY,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Unique identifier for a live connection
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Sending half of one connection's outbound queue.
///
/// The queue is bounded, so a slow client makes `send` wait rather than
/// buffering without limit.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueue one frame, then yield so the writer can flush it.
    pub async fn send(&self, message: ServerMessage) -> Result<(), RelayError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| RelayError::ConnectionClosed)?;
        tokio::task::yield_now().await;
        Ok(())
    }

    /// Enqueue without waiting. Returns false if the queue is full or closed.
    pub fn try_send(&self, message: ServerMessage) -> bool {
        self.tx.try_send(message).is_ok()
    }
}

/// The set of live connections
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    next_id: AtomicU64,
    limits: ConnectionLimits,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(ConnectionLimits::default())
    }
}

impl ConnectionRegistry {
    pub fn new(limits: ConnectionLimits) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            limits: ConnectionLimits {
                send_channel_capacity: limits.send_channel_capacity.max(1),
                inbound_queue_capacity: limits.inbound_queue_capacity.max(1),
                max_message_bytes: limits.max_message_bytes.max(1),
            },
        }
    }

    pub fn limits(&self) -> ConnectionLimits {
        self.limits
    }

    /// Allocate an id and outbound queue for a new connection
    pub async fn register(&self) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(self.limits.send_channel_capacity);
        let handle = ConnectionHandle::new(id, tx);

        self.connections.write().await.insert(id, handle.clone());
        debug!(conn_id = %id, "Connection registered");
        (handle, rx)
    }

    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(&id).is_some();
        if removed {
            debug!(conn_id = %id, "Connection unregistered");
        }
        removed
    }

    /// Deliver to one connection. Returns false if it is unknown or gone.
    pub async fn send(&self, id: ConnectionId, message: ServerMessage) -> bool {
        let handle = self.connections.read().await.get(&id).cloned();
        match handle {
            Some(handle) => handle.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Deliver to every live connection, returning how many accepted it
    pub async fn broadcast(&self, message: ServerMessage) -> usize {
        let handles: Vec<ConnectionHandle> =
            self.connections.read().await.values().cloned().collect();

        let mut delivered = 0;
        for handle in handles {
            if handle.send(message.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
