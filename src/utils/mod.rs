//! The `utils` module provides shared definitions used across the gateway:
//! the crate-wide error type and the logging bootstrap.

pub mod error;
pub mod logging;

pub use error::GatewayError;
