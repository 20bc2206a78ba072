//! The `client` module defines the handle to one accepted WebSocket connection.
//!
//! A `Connection` is cheap to clone: the registry and the relay loop hold
//! clones, while the lifecycle handler that created it owns the socket.

pub mod connection;
pub use connection::{Connection, ConnectionId, OUTBOUND_QUEUE_CAPACITY};
