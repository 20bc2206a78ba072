//! The `error` module defines the error type shared by the gateway.
//!
//! Authentication failures are deliberately absent: the identity extractor
//! collapses every failure into "no identity" instead of reporting it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid key material: {0}")]
    KeyMaterial(String),

    #[error("bus error: {0}")]
    Bus(#[from] redis::RedisError),

    #[error("bus subscription ended")]
    BusClosed,

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("malformed token segment: {0}")]
    MalformedToken(String),

    #[error("outbound queue of connection {0} is full")]
    QueueFull(String),

    #[error("connection {0} is closed")]
    ConnectionClosed(String),
}
