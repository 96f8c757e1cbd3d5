//! Billing-recovery sweep: revive jobs parked by the billing gate once
//! the tenant is back in good standing.
//!
//! Revival is deliberately conservative: only a fully `Active` billing
//! state qualifies (a tenant merely leaving grace period for past-due
//! stays parked), and each job gets at most `max_auto_retries` automatic
//! revivals before an operator has to intervene.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use wareflow_audit::{AuditAction, AuditEvent, AuditSink};
use wareflow_core::{BillingState, JobId, TenantId};
use wareflow_entitlements::BillingResolver;
use wareflow_jobs::JobStore;

use crate::error::EngineError;

/// Automatic revivals per job before operator intervention is required.
pub const DEFAULT_MAX_AUTO_RETRIES: u32 = 3;

/// What one recovery sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Jobs moved back into the retry path, grouped by tenant.
    pub revived: BTreeMap<TenantId, Vec<JobId>>,
    /// Tenants inspected and left alone because billing is still unhealthy.
    pub tenants_still_blocked: usize,
    /// Jobs skipped because they hit the automatic-revival cap.
    pub skipped_retry_cap: usize,
}

impl RecoveryReport {
    pub fn revived_count(&self) -> usize {
        self.revived.values().map(Vec::len).sum()
    }
}

/// Periodic sweep over billing-blocked jobs.
pub struct RecoveryRetrier<S, B, A> {
    store: S,
    resolver: B,
    audit: A,
    max_auto_retries: u32,
}

impl<S, B, A> RecoveryRetrier<S, B, A>
where
    S: JobStore,
    B: BillingResolver,
    A: AuditSink,
{
    pub fn new(store: S, resolver: B, audit: A) -> Self {
        Self {
            store,
            resolver,
            audit,
            max_auto_retries: DEFAULT_MAX_AUTO_RETRIES,
        }
    }

    pub fn with_max_auto_retries(mut self, max_auto_retries: u32) -> Self {
        self.max_auto_retries = max_auto_retries;
        self
    }

    /// Run one recovery sweep at `now`.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<RecoveryReport, EngineError> {
        let mut report = RecoveryReport::default();

        for tenant_id in self.store.blocked_tenants()? {
            let snapshot = self.resolver.resolve_closed(tenant_id);
            if snapshot.state != BillingState::Active {
                report.tenants_still_blocked += 1;
                continue;
            }

            let mut revived = Vec::new();
            for job in self.store.blocked_jobs(tenant_id)? {
                if job.retry_count >= self.max_auto_retries {
                    report.skipped_retry_cap += 1;
                    continue;
                }
                if self.store.unblock_for_retry(job.id, now)? {
                    self.audit.emit(
                        AuditEvent::new(tenant_id, AuditAction::BillingRecovered, now)
                            .with_job(job.id)
                            .with_connection(job.connection_id)
                            .with_metadata(serde_json::json!({
                                "reason": "billing_recovered",
                                "previously_blocked_state": job.blocked_billing_state,
                            })),
                    );
                    revived.push(job.id);
                }
            }
            if !revived.is_empty() {
                info!(
                    tenant_id = %tenant_id,
                    revived = revived.len(),
                    "revived billing-blocked jobs"
                );
                report.revived.insert(tenant_id, revived);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wareflow_audit::InMemoryAuditSink;
    use wareflow_core::{BillingSnapshot, ConnectionId, PlanTier};
    use wareflow_entitlements::StaticBillingResolver;
    use wareflow_jobs::{InMemoryJobStore, Job, JobCategory, JobStatus};

    fn blocked_job(
        store: &InMemoryJobStore,
        tenant: TenantId,
        now: DateTime<Utc>,
        retry_count: u32,
    ) -> Job {
        let mut job = store
            .enqueue(Job::new(
                tenant,
                ConnectionId::new(),
                JobCategory::Exports,
                serde_json::Value::Null,
                now,
            ))
            .unwrap();
        store.claim_queued(100, now).unwrap();
        for _ in 0..retry_count {
            store.mark_retrying(job.id, "transient", now).unwrap();
            store.claim_due_retries(100, now).unwrap();
        }
        store
            .mark_blocked(job.id, BillingState::Canceled, now)
            .unwrap();
        job = store.get(tenant, job.id).unwrap().unwrap();
        job
    }

    #[test]
    fn revives_blocked_jobs_when_billing_recovers() {
        let store = InMemoryJobStore::arc();
        let resolver = Arc::new(StaticBillingResolver::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let tenant = TenantId::new();
        let now = Utc::now();

        let job = blocked_job(&store, tenant, now, 0);
        resolver.set(tenant, BillingSnapshot::active(PlanTier::Pro));

        let retrier = RecoveryRetrier::new(store.clone(), resolver, audit.clone());
        let report = retrier.sweep(now).unwrap();

        assert_eq!(report.revived_count(), 1);
        assert_eq!(report.revived[&tenant], vec![job.id]);

        let stored = store.get(tenant, job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Retrying);
        assert_eq!(stored.blocked_at, None);

        let events = audit.events_for(AuditAction::BillingRecovered);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata["reason"], "billing_recovered");
    }

    #[test]
    fn leaves_jobs_parked_while_billing_is_unhealthy() {
        let store = InMemoryJobStore::arc();
        let resolver = Arc::new(StaticBillingResolver::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let tenant = TenantId::new();
        let now = Utc::now();

        let job = blocked_job(&store, tenant, now, 0);
        // past_due is degraded, not recovered
        resolver.set(
            tenant,
            BillingSnapshot::new(BillingState::PastDue, Some(PlanTier::Pro)),
        );

        let retrier = RecoveryRetrier::new(store.clone(), resolver, audit.clone());
        let report = retrier.sweep(now).unwrap();

        assert_eq!(report.revived_count(), 0);
        assert_eq!(report.tenants_still_blocked, 1);
        let stored = store.get(tenant, job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::BlockedDueToBilling);
        assert!(audit.events_for(AuditAction::BillingRecovered).is_empty());
    }

    #[test]
    fn retry_cap_requires_operator_intervention() {
        let store = InMemoryJobStore::arc();
        let resolver = Arc::new(StaticBillingResolver::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let tenant = TenantId::new();
        let now = Utc::now();

        let job = blocked_job(&store, tenant, now, DEFAULT_MAX_AUTO_RETRIES);
        resolver.set(tenant, BillingSnapshot::active(PlanTier::Pro));

        let retrier = RecoveryRetrier::new(store.clone(), resolver, audit);
        let report = retrier.sweep(now).unwrap();

        assert_eq!(report.revived_count(), 0);
        assert_eq!(report.skipped_retry_cap, 1);
        let stored = store.get(tenant, job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::BlockedDueToBilling);
    }

    #[test]
    fn sweep_is_idempotent() {
        let store = InMemoryJobStore::arc();
        let resolver = Arc::new(StaticBillingResolver::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let tenant = TenantId::new();
        let now = Utc::now();

        blocked_job(&store, tenant, now, 0);
        resolver.set(tenant, BillingSnapshot::active(PlanTier::Pro));

        let retrier = RecoveryRetrier::new(store, resolver, audit.clone());
        retrier.sweep(now).unwrap();
        let second = retrier.sweep(now).unwrap();

        // Already revived: nothing blocked, nothing double-audited
        assert_eq!(second.revived_count(), 0);
        assert_eq!(audit.events_for(AuditAction::BillingRecovered).len(), 1);
    }
}
