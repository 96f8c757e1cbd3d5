//! Scheduler sweep: walk enabled connections and dispatch the due ones.
//!
//! One sweep is one bounded pass. Everything that goes wrong with a single
//! connection is counted and logged, never propagated, so one broken row
//! cannot starve the rest of the fleet.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use wareflow_audit::{AuditAction, AuditEvent, AuditSink};
use wareflow_entitlements::{check_job_gate, sla, BillingResolver};
use wareflow_jobs::{JobCategory, JobStore};

use crate::dispatcher::{DispatchError, JobDispatcher};
use crate::error::EngineError;
use crate::registry::ConnectionRegistry;

/// Cap on connections evaluated per sweep. Keeps a single pass bounded on
/// large fleets; the next sweep picks up where the ordering left off,
/// since dispatched connections stop being least-recently-synced.
pub const DEFAULT_SWEEP_BATCH_LIMIT: usize = 500;

/// Counters for one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub evaluated: usize,
    pub dispatched: usize,
    pub skipped_not_due: usize,
    pub skipped_active: usize,
    pub skipped_entitlement: usize,
    pub errors: usize,
}

/// Periodic scheduler pass over the connection fleet.
pub struct SchedulerSweep<R, S, B, A> {
    registry: R,
    dispatcher: JobDispatcher<S, A>,
    resolver: B,
    audit: A,
    category: JobCategory,
    batch_limit: usize,
}

impl<R, S, B, A> SchedulerSweep<R, S, B, A>
where
    R: ConnectionRegistry,
    S: JobStore,
    B: BillingResolver,
    A: AuditSink + Clone,
{
    pub fn new(registry: R, store: S, resolver: B, audit: A) -> Self {
        Self {
            registry,
            dispatcher: JobDispatcher::new(store, audit.clone()),
            resolver,
            audit,
            category: JobCategory::Ordinary,
            batch_limit: DEFAULT_SWEEP_BATCH_LIMIT,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    /// Sweep a non-default category (e.g. a nightly exports pass).
    pub fn with_category(mut self, category: JobCategory) -> Self {
        self.category = category;
        self
    }

    /// Run one sweep pass at `now`.
    pub fn run(&self, now: DateTime<Utc>) -> Result<SweepStats, EngineError> {
        let connections = self.registry.list_enabled(self.batch_limit)?;
        let mut stats = SweepStats::default();

        for connection in connections {
            stats.evaluated += 1;

            let snapshot = self.resolver.resolve_closed(connection.tenant_id);
            let interval = sla::interval_minutes(snapshot.plan);
            if !sla::is_due(connection.last_sync_at, interval, now) {
                stats.skipped_not_due += 1;
                continue;
            }

            let gate = check_job_gate(&snapshot, self.category);
            if !gate.allowed {
                stats.skipped_entitlement += 1;
                self.audit.emit(
                    AuditEvent::new(
                        connection.tenant_id,
                        AuditAction::SkippedDueToEntitlement,
                        now,
                    )
                    .with_connection(connection.id)
                    .with_metadata(serde_json::json!({
                        "category": self.category.as_str(),
                        "billing_state": gate.billing_state.as_str(),
                        "reason": gate.reason,
                    })),
                );
                continue;
            }
            if gate.should_warn {
                warn!(
                    tenant_id = %connection.tenant_id,
                    billing_state = %gate.billing_state,
                    "dispatching for tenant with degraded billing state"
                );
            }

            match self.dispatcher.dispatch(
                &connection,
                self.category,
                serde_json::json!({"trigger": "scheduler"}),
                now,
            ) {
                Ok(_) => stats.dispatched += 1,
                Err(DispatchError::ActiveJobExists(_)) => stats.skipped_active += 1,
                Err(DispatchError::Store(err)) => {
                    stats.errors += 1;
                    warn!(
                        connection_id = %connection.id,
                        error = %err,
                        "sweep failed to dispatch for connection"
                    );
                }
            }
        }

        info!(
            evaluated = stats.evaluated,
            dispatched = stats.dispatched,
            skipped_not_due = stats.skipped_not_due,
            skipped_active = stats.skipped_active,
            skipped_entitlement = stats.skipped_entitlement,
            errors = stats.errors,
            "sweep complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use chrono::Duration;
    use wareflow_audit::InMemoryAuditSink;
    use wareflow_core::{BillingSnapshot, BillingState, Connection, PlanTier, SyncStatus, TenantId};
    use wareflow_entitlements::StaticBillingResolver;
    use wareflow_jobs::InMemoryJobStore;

    use crate::registry::InMemoryConnectionRegistry;

    fn sweep_fixture() -> (
        Arc<InMemoryConnectionRegistry>,
        Arc<InMemoryJobStore>,
        Arc<StaticBillingResolver>,
        Arc<InMemoryAuditSink>,
    ) {
        (
            Arc::new(InMemoryConnectionRegistry::new()),
            InMemoryJobStore::arc(),
            Arc::new(StaticBillingResolver::new()),
            Arc::new(InMemoryAuditSink::new()),
        )
    }

    #[test]
    fn dispatches_due_connections() {
        let (registry, store, resolver, audit) = sweep_fixture();
        let tenant = TenantId::new();
        let now = Utc::now();

        resolver.set(tenant, BillingSnapshot::active(PlanTier::Pro));
        registry.insert(Connection::new(tenant, "shopify", "never synced"));
        registry.insert(
            Connection::new(tenant, "shopify", "stale")
                .with_last_sync(now - Duration::hours(2), SyncStatus::Success),
        );
        registry.insert(
            Connection::new(tenant, "shopify", "fresh")
                .with_last_sync(now - Duration::minutes(5), SyncStatus::Success),
        );

        let sweep =
            SchedulerSweep::new(registry, store.clone(), resolver, audit.clone());
        let stats = sweep.run(now).unwrap();

        assert_eq!(stats.evaluated, 3);
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.skipped_not_due, 1);
        assert_eq!(audit.events_for(AuditAction::Dispatched).len(), 2);
    }

    #[test]
    fn skips_connections_with_an_active_job() {
        let (registry, store, resolver, audit) = sweep_fixture();
        let tenant = TenantId::new();
        let now = Utc::now();

        resolver.set(tenant, BillingSnapshot::active(PlanTier::Pro));
        registry.insert(Connection::new(tenant, "amazon", "store"));

        let sweep = SchedulerSweep::new(registry, store, resolver, audit);
        let first = sweep.run(now).unwrap();
        assert_eq!(first.dispatched, 1);

        // Second pass: the job from the first pass is still queued
        let second = sweep.run(now + Duration::hours(2)).unwrap();
        assert_eq!(second.dispatched, 0);
        assert_eq!(second.skipped_active, 1);
    }

    #[test]
    fn unknown_tenant_falls_back_to_daily_interval() {
        let (registry, store, resolver, audit) = sweep_fixture();
        let tenant = TenantId::new();
        let now = Utc::now();

        // No billing record at all: resolution fails closed, plan is None.
        registry.insert(
            Connection::new(tenant, "shopify", "store")
                .with_last_sync(now - Duration::hours(6), SyncStatus::Success),
        );

        let sweep = SchedulerSweep::new(registry, store, resolver, audit);

        // Six hours stale is not due on the fallback daily interval
        let stats = sweep.run(now).unwrap();
        assert_eq!(stats.skipped_not_due, 1);

        // A day later it is, and ordinary sync runs despite the closed gate
        let stats = sweep.run(now + Duration::hours(19)).unwrap();
        assert_eq!(stats.dispatched, 1);
    }

    #[test]
    fn premium_sweep_respects_the_gate() {
        let (registry, store, resolver, audit) = sweep_fixture();
        let tenant = TenantId::new();
        let now = Utc::now();

        resolver.set(
            tenant,
            BillingSnapshot::new(BillingState::Canceled, Some(PlanTier::Pro)),
        );
        registry.insert(Connection::new(tenant, "shopify", "store"));

        let sweep = SchedulerSweep::new(registry, store, resolver, audit.clone())
            .with_category(wareflow_jobs::JobCategory::Exports);
        let stats = sweep.run(now).unwrap();

        assert_eq!(stats.skipped_entitlement, 1);
        assert_eq!(stats.dispatched, 0);
        let events = audit.events_for(AuditAction::SkippedDueToEntitlement);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata["billing_state"], "canceled");
    }

    #[test]
    fn batch_limit_bounds_one_pass() {
        let (registry, store, resolver, audit) = sweep_fixture();
        let tenant = TenantId::new();
        let now = Utc::now();

        resolver.set(tenant, BillingSnapshot::active(PlanTier::Enterprise));
        for i in 0..5 {
            registry.insert(Connection::new(tenant, "shopify", format!("store {i}")));
        }

        let sweep =
            SchedulerSweep::new(registry, store, resolver, audit).with_batch_limit(3);
        let stats = sweep.run(now).unwrap();

        assert_eq!(stats.evaluated, 3);
        assert_eq!(stats.dispatched, 3);
    }
}
