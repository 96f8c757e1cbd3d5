//! Connection record: a configured link between a tenant and a data source.
//!
//! Connections are owned by the ingestion subsystem. This engine reads them
//! to decide scheduling and writes back only `last_sync_at` /
//! `last_sync_status` after a successful sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ConnectionId, TenantId};

/// Outcome of the most recent sync, as recorded on the connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Failed,
}

/// A tenant's configured data-source connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub tenant_id: TenantId,
    /// Source platform identifier (e.g. "shopify", "google_ads").
    pub source_type: String,
    /// Human-readable connection name.
    pub name: String,
    /// Disabled connections are never scheduled.
    pub enabled: bool,
    /// When the connection last completed a successful sync.
    /// `None` means it has never synced and is always due.
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<SyncStatus>,
}

impl Connection {
    pub fn new(
        tenant_id: TenantId,
        source_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            tenant_id,
            source_type: source_type.into(),
            name: name.into(),
            enabled: true,
            last_sync_at: None,
            last_sync_status: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_last_sync(mut self, at: DateTime<Utc>, status: SyncStatus) -> Self {
        self.last_sync_at = Some(at);
        self.last_sync_status = Some(status);
        self
    }

    /// Record a successful sync completion.
    pub fn record_sync_success(&mut self, at: DateTime<Utc>) {
        self.last_sync_at = Some(at);
        self.last_sync_status = Some(SyncStatus::Success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_connection_has_never_synced() {
        let conn = Connection::new(TenantId::new(), "shopify", "main store");
        assert!(conn.enabled);
        assert!(conn.last_sync_at.is_none());
        assert!(conn.last_sync_status.is_none());
    }

    #[test]
    fn record_sync_success_sets_both_fields() {
        let mut conn = Connection::new(TenantId::new(), "klaviyo", "email");
        let now = Utc::now();
        conn.record_sync_success(now);
        assert_eq!(conn.last_sync_at, Some(now));
        assert_eq!(conn.last_sync_status, Some(SyncStatus::Success));
    }
}
