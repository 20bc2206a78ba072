//! # West
//!
//! `west` is a real-time notification gateway. Clients open a WebSocket,
//! prove who they are during the handshake, and then receive every event
//! published on the bus that targets their identity.
//!
//! ## Core Modules
//!
//! - `auth`: identity extraction from the handshake (trusted parameter or bearer token).
//! - `client`: handle to one live connection.
//! - `config`: loading settings from `config/default` and the environment.
//! - `registry`: which identity is reachable through which connection.
//! - `relay`: the loop that reads the bus and forwards events.
//! - `transport`: the WebSocket server, health probe and connection lifecycle.
//! - `utils`: error type and logging bootstrap.

pub mod auth;
pub mod client;
pub mod config;
pub mod registry;
pub mod relay;
pub mod transport;
pub mod utils;
