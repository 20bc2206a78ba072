//! The `transport` module owns the network side of the gateway.
//!
//! It accepts TCP connections, answers health probes, runs the WebSocket
//! handshake with identity extraction, and keeps each identified connection
//! registered for as long as it stays open. Client-sent frames are read and
//! discarded; the gateway only pushes.

pub mod stream;
pub mod websocket;

pub use websocket::{Gateway, serve, start_websocket_server};

#[cfg(test)]
mod tests;
