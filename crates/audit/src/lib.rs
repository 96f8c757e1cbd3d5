//! Audit trail for job lifecycle events.
//!
//! ## Design
//!
//! Auditing is strictly fire-and-forget: sinks never return errors and the
//! engine never changes behavior based on whether an event was recorded.
//! A sink that drops events degrades the trail, not the sync pipeline.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use wareflow_core::{ConnectionId, JobId, TenantId};

/// Every lifecycle transition the engine records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Dispatched,
    Started,
    Completed,
    Failed,
    RetryScheduled,
    DeadLettered,
    BlockedDueToBilling,
    BillingRecovered,
    SkippedDueToEntitlement,
    Cancelled,
}

impl AuditAction {
    /// Dotted action name as recorded in the trail.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatched => "job.dispatched",
            Self::Started => "job.started",
            Self::Completed => "job.completed",
            Self::Failed => "job.failed",
            Self::RetryScheduled => "job.retry_scheduled",
            Self::DeadLettered => "job.dead_lettered",
            Self::BlockedDueToBilling => "job.blocked_due_to_billing",
            Self::BillingRecovered => "job.billing_recovered",
            Self::SkippedDueToEntitlement => "job.skipped_due_to_entitlement",
            Self::Cancelled => "job.cancelled",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub job_id: Option<JobId>,
    pub connection_id: Option<ConnectionId>,
    pub action: AuditAction,
    pub occurred_at: DateTime<Utc>,
    /// Action-specific context (error text, billing state, skip reason).
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    pub fn new(tenant_id: TenantId, action: AuditAction, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            tenant_id,
            job_id: None,
            connection_id: None,
            action,
            occurred_at,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_connection(mut self, connection_id: ConnectionId) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Audit event destination.
pub trait AuditSink: Send + Sync {
    /// Record an event. Infallible by contract.
    fn emit(&self, event: AuditEvent);
}

/// Sink that writes events to the tracing pipeline as structured logs.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            action = %event.action,
            tenant_id = %event.tenant_id,
            job_id = ?event.job_id,
            connection_id = ?event.connection_id,
            metadata = %event.metadata,
            "audit"
        );
    }
}

/// Capturing sink for tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events matching an action, in emission order.
    pub fn events_for(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl<S: AuditSink + ?Sized> AuditSink for std::sync::Arc<S> {
    fn emit(&self, event: AuditEvent) {
        (**self).emit(event)
    }
}
