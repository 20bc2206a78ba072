use std::fmt;

use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::utils::GatewayError;

/// Frames a connection may have queued before further events are dropped.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Distinguishes two connections opened for the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Non-owning handle to a live WebSocket connection.
///
/// Frames pushed through `sender` are written to the socket, in order, by the
/// connection's writer task. Dropping a handle never closes the socket; the
/// lifecycle handler keeps its own handle until the connection ends.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    sender: Sender<WsMessage>,
}

impl Connection {
    pub fn new(sender: Sender<WsMessage>) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a text frame without waiting. Fails once the writer task has
    /// gone away, or when the peer is not draining its queue.
    pub fn send_text(&self, text: &str) -> Result<(), GatewayError> {
        self.sender
            .try_send(WsMessage::text(text.to_owned()))
            .map_err(|e| match e {
                TrySendError::Full(_) => GatewayError::QueueFull(self.id.to_string()),
                TrySendError::Closed(_) => GatewayError::ConnectionClosed(self.id.to_string()),
            })
    }
}
