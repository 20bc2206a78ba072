use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::client::{Connection, ConnectionId};
use crate::registry::identity::Identity;

/// Mapping from identity to the connection currently reachable for it.
///
/// Shared as `Arc<Registry>` between every connection task and the relay loop.
/// The lock is held only for map operations, never across an await.
#[derive(Debug, Default)]
pub struct Registry {
    connections: Mutex<HashMap<Identity, Connection>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Identity, Connection>> {
        // a panicked holder cannot leave the map half-updated
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces the entry for `identity` (last writer wins).
    ///
    /// A replaced connection is not closed; its own handler still owns it.
    pub fn register(&self, identity: Identity, connection: Connection) {
        let id = connection.id();
        if let Some(previous) = self.lock().insert(identity.clone(), connection) {
            debug!(
                "Connection {} for {} replaced by {}",
                previous.id(),
                identity,
                id
            );
        }
    }

    /// Removes the entry for `identity` only if it is still `connection`.
    ///
    /// Returns whether an entry was removed.
    pub fn deregister(&self, identity: &Identity, connection: ConnectionId) -> bool {
        let mut connections = self.lock();
        match connections.get(identity) {
            Some(current) if current.id() == connection => {
                connections.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// Point-in-time copy of every registered pair.
    pub fn snapshot(&self) -> Vec<(Identity, Connection)> {
        self.lock()
            .iter()
            .map(|(identity, conn)| (identity.clone(), conn.clone()))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, identity: &Identity) -> Option<Connection> {
        self.lock().get(identity).cloned()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
