//! Connection registry: the sweep's view of which connections exist.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use wareflow_core::{Connection, ConnectionId};

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("connection not found: {0}")]
    NotFound(ConnectionId),
    #[error("registry error: {0}")]
    Storage(String),
}

/// Source of connection rows for the sweep.
pub trait ConnectionRegistry: Send + Sync {
    /// Enabled connections, least-recently-synced first; never-synced
    /// connections sort before everything else. At most `limit` rows.
    fn list_enabled(&self, limit: usize) -> Result<Vec<Connection>, RegistryError>;

    /// Record a completed sync so the SLA clock restarts.
    fn record_sync_success(
        &self,
        connection_id: ConnectionId,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError>;
}

/// In-memory registry for tests and dev runs.
#[derive(Debug, Default)]
pub struct InMemoryConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl InMemoryConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection: Connection) {
        self.connections
            .write()
            .unwrap()
            .insert(connection.id, connection);
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<Connection> {
        self.connections.read().unwrap().get(&connection_id).cloned()
    }
}

impl ConnectionRegistry for InMemoryConnectionRegistry {
    fn list_enabled(&self, limit: usize) -> Result<Vec<Connection>, RegistryError> {
        let connections = self.connections.read().unwrap();
        let mut enabled: Vec<Connection> = connections
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect();
        // None (never synced) sorts before any Some, which is exactly the
        // priority we want.
        enabled.sort_by_key(|c| (c.last_sync_at, c.id));
        enabled.truncate(limit);
        Ok(enabled)
    }

    fn record_sync_success(
        &self,
        connection_id: ConnectionId,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let mut connections = self.connections.write().unwrap();
        let connection = connections
            .get_mut(&connection_id)
            .ok_or(RegistryError::NotFound(connection_id))?;
        connection.record_sync_success(at);
        Ok(())
    }
}

impl<R: ConnectionRegistry + ?Sized> ConnectionRegistry for std::sync::Arc<R> {
    fn list_enabled(&self, limit: usize) -> Result<Vec<Connection>, RegistryError> {
        (**self).list_enabled(limit)
    }

    fn record_sync_success(
        &self,
        connection_id: ConnectionId,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        (**self).record_sync_success(connection_id, at)
    }
}
