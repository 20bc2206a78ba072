//! The `relay` module bridges the event bus to connected clients.
//!
//! One relay loop runs for the lifetime of the process. It reads bus
//! messages strictly in order, finds the event's target identity, and pushes
//! the event text unchanged to every registered connection for that identity.
//! Bad messages and failed sends are logged and skipped; only the bus going
//! away ends the loop.

pub mod bus;
pub mod envelope;

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tracing::{debug, error, warn};

use crate::registry::Registry;
use crate::utils::GatewayError;

pub use bus::{BusMessage, BusStream, subscribe};
pub use envelope::Envelope;

pub struct EventRelay {
    registry: Arc<Registry>,
    envelope: Envelope,
}

impl EventRelay {
    pub fn new(registry: Arc<Registry>, envelope: Envelope) -> Self {
        Self { registry, envelope }
    }

    /// Delivers one raw event to its target's connections and returns how
    /// many sends succeeded.
    pub fn forward(&self, payload: &[u8]) -> Result<usize, GatewayError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| GatewayError::MalformedEvent(e.to_string()))?;
        let event: serde_json::Value =
            serde_json::from_str(text).map_err(|e| GatewayError::MalformedEvent(e.to_string()))?;
        let target = self.envelope.target(&event).ok_or_else(|| {
            GatewayError::MalformedEvent(format!("no target identity in {}", self.envelope))
        })?;

        let mut delivered = 0;
        for (identity, connection) in self.registry.snapshot() {
            if identity != *target {
                continue;
            }
            match connection.send_text(text) {
                Ok(()) => {
                    debug!("Forwarded event to {identity} on {}", connection.id());
                    delivered += 1;
                }
                Err(e) => warn!("Failed to send event to {identity}: {e}"),
            }
        }

        if delivered == 0 {
            debug!("No live connection for {target}");
        }
        Ok(delivered)
    }

    /// Consumes the bus until it fails or ends. Never returns `Ok`.
    pub async fn run<S>(&self, mut bus: S) -> Result<(), GatewayError>
    where
        S: Stream<Item = Result<BusMessage, GatewayError>> + Unpin,
    {
        while let Some(message) = bus.next().await {
            match message {
                Ok(BusMessage::Data(payload)) => {
                    if let Err(e) = self.forward(&payload) {
                        warn!("Skipping bus message: {e}");
                    }
                }
                Ok(BusMessage::Control(kind)) => {
                    debug!("Ignoring bus control message: {kind}");
                }
                Err(e) => {
                    error!("Event bus failed: {e}");
                    return Err(e);
                }
            }
        }

        error!("Event bus subscription ended");
        Err(GatewayError::BusClosed)
    }
}
