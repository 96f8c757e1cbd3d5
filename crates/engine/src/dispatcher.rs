//! Job dispatch: the single path by which jobs enter the queue.

use chrono::{DateTime, Utc};
use tracing::debug;

use wareflow_audit::{AuditAction, AuditEvent, AuditSink};
use wareflow_core::{Connection, JobId, TenantId};
use wareflow_jobs::{Job, JobCategory, JobStore, JobStoreError};

/// Dispatch failure. `ActiveJobExists` is an expected outcome the sweep
/// counts rather than an error it propagates.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("connection {0} already has an active job")]
    ActiveJobExists(wareflow_core::ConnectionId),
    #[error(transparent)]
    Store(JobStoreError),
}

/// Creates jobs and records their dispatch.
pub struct JobDispatcher<S, A> {
    store: S,
    audit: A,
}

impl<S: JobStore, A: AuditSink> JobDispatcher<S, A> {
    pub fn new(store: S, audit: A) -> Self {
        Self { store, audit }
    }

    /// Enqueue a job for a connection. The store enforces the
    /// one-active-job-per-connection invariant atomically; losing that
    /// race surfaces as `ActiveJobExists`.
    pub fn dispatch(
        &self,
        connection: &Connection,
        category: JobCategory,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Job, DispatchError> {
        let job = Job::new(connection.tenant_id, connection.id, category, metadata, now);

        let job = self.store.enqueue(job).map_err(|err| match err {
            JobStoreError::ActiveJobExists(id) => DispatchError::ActiveJobExists(id),
            other => DispatchError::Store(other),
        })?;

        debug!(
            job_id = %job.id,
            connection_id = %connection.id,
            category = %category,
            "job dispatched"
        );
        self.audit.emit(
            AuditEvent::new(connection.tenant_id, AuditAction::Dispatched, now)
                .with_job(job.id)
                .with_connection(connection.id)
                .with_metadata(serde_json::json!({
                    "category": category.as_str(),
                    "source_type": connection.source_type,
                })),
        );

        Ok(job)
    }

    /// Operator cancel. Returns false when the job already reached a
    /// terminal state; the audit record is only written for an actual
    /// cancellation.
    pub fn cancel(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<bool, DispatchError> {
        // Tenant scoping first so one tenant cannot cancel another's jobs.
        let job = self
            .store
            .get(tenant_id, job_id)
            .map_err(DispatchError::Store)?
            .ok_or_else(|| {
                DispatchError::Store(JobStoreError::NotFound(job_id))
            })?;

        let cancelled = self.store.cancel(job_id, now).map_err(DispatchError::Store)?;
        if cancelled {
            self.audit.emit(
                AuditEvent::new(tenant_id, AuditAction::Cancelled, now)
                    .with_job(job_id)
                    .with_connection(job.connection_id),
            );
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wareflow_audit::InMemoryAuditSink;
    use wareflow_core::TenantId;
    use wareflow_jobs::{InMemoryJobStore, JobStatus};

    #[test]
    fn dispatch_enqueues_and_audits() {
        let store = InMemoryJobStore::arc();
        let audit = Arc::new(InMemoryAuditSink::new());
        let dispatcher = JobDispatcher::new(store.clone(), audit.clone());

        let connection = Connection::new(TenantId::new(), "shopify", "main");
        let now = Utc::now();

        let job = dispatcher
            .dispatch(&connection, JobCategory::Ordinary, serde_json::Value::Null, now)
            .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        let stored = store.get(connection.tenant_id, job.id).unwrap().unwrap();
        assert_eq!(stored.connection_id, connection.id);

        let events = audit.events_for(AuditAction::Dispatched);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].job_id, Some(job.id));
    }

    #[test]
    fn second_dispatch_surfaces_active_job() {
        let store = InMemoryJobStore::arc();
        let audit = Arc::new(InMemoryAuditSink::new());
        let dispatcher = JobDispatcher::new(store, audit.clone());

        let connection = Connection::new(TenantId::new(), "shopify", "main");
        let now = Utc::now();

        dispatcher
            .dispatch(&connection, JobCategory::Ordinary, serde_json::Value::Null, now)
            .unwrap();
        let err = dispatcher
            .dispatch(&connection, JobCategory::Ordinary, serde_json::Value::Null, now)
            .unwrap_err();

        assert!(matches!(err, DispatchError::ActiveJobExists(id) if id == connection.id));
        // The failed dispatch must not leave an audit record
        assert_eq!(audit.events_for(AuditAction::Dispatched).len(), 1);
    }

    #[test]
    fn cancel_audits_once_and_tolerates_repeats() {
        let store = InMemoryJobStore::arc();
        let audit = Arc::new(InMemoryAuditSink::new());
        let dispatcher = JobDispatcher::new(store, audit.clone());

        let connection = Connection::new(TenantId::new(), "shopify", "main");
        let now = Utc::now();
        let job = dispatcher
            .dispatch(&connection, JobCategory::Ordinary, serde_json::Value::Null, now)
            .unwrap();

        assert!(dispatcher.cancel(connection.tenant_id, job.id, now).unwrap());
        // Second cancel is a no-op against the now-terminal job
        assert!(!dispatcher.cancel(connection.tenant_id, job.id, now).unwrap());
        assert_eq!(audit.events_for(AuditAction::Cancelled).len(), 1);
    }

    #[test]
    fn cancel_is_tenant_scoped() {
        let store = InMemoryJobStore::arc();
        let audit = Arc::new(InMemoryAuditSink::new());
        let dispatcher = JobDispatcher::new(store, audit);

        let connection = Connection::new(TenantId::new(), "shopify", "main");
        let now = Utc::now();
        let job = dispatcher
            .dispatch(&connection, JobCategory::Ordinary, serde_json::Value::Null, now)
            .unwrap();

        let err = dispatcher.cancel(TenantId::new(), job.id, now).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Store(wareflow_jobs::JobStoreError::TenantIsolation)
        ));
    }
}
