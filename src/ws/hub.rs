//! Outbound message routing to connected peers

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Identifies one WebSocket connection for its whole lifetime
pub type ConnId = Uuid;

/// Per-connection outbound queue depth
pub const OUTBOUND_BUFFER: usize = 128;

/// Registry of live connections and their outbound queues.
///
/// Sending never waits: a peer whose queue is full loses the message.
#[derive(Clone, Default)]
pub struct ConnectionHub {
    peers: Arc<DashMap<ConnId, mpsc::Sender<ServerMsg>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection; the returned receiver feeds its socket writer
    pub fn register(&self, conn_id: ConnId) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.peers.insert(conn_id, tx);
        rx
    }

    pub fn unregister(&self, conn_id: ConnId) {
        self.peers.remove(&conn_id);
    }

    /// Queue a message for one peer. Returns false if it was not delivered.
    pub fn send(&self, conn_id: ConnId, msg: ServerMsg) -> bool {
        let Some(tx) = self.peers.get(&conn_id) else {
            debug!(conn_id = %conn_id, event = msg.event_name(), "Send to unknown peer");
            return false;
        };

        match tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(conn_id = %conn_id, event = msg.event_name(), "Outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
