//! Sync executor: claims jobs and drives them to a terminal or parked
//! state.
//!
//! The billing gate runs again here, after the claim. Billing state can
//! change between dispatch and execution (a card expires while the job
//! sits queued), so the dispatch-time check is advisory and the run-time
//! check is authoritative.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use wareflow_audit::{AuditAction, AuditEvent, AuditSink};
use wareflow_entitlements::{check_job_gate, BillingResolver};
use wareflow_jobs::{Job, JobStore, RetryDecision, RetryPolicy};

use crate::connector::{ConnectorExecution, SyncOutcome};
use crate::error::EngineError;
use crate::registry::ConnectionRegistry;

/// Counters for one executor cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    /// Jobs claimed from the queued pool.
    pub queued_claimed: usize,
    /// Jobs claimed from the due-retry pool.
    pub retries_claimed: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl CycleStats {
    pub fn processed(&self) -> usize {
        self.queued_claimed + self.retries_claimed
    }
}

/// Claims and runs jobs against a connector.
pub struct SyncExecutor<S, R, B, A, C> {
    store: S,
    registry: R,
    resolver: B,
    audit: A,
    connector: C,
    retry_policy: RetryPolicy,
}

impl<S, R, B, A, C> SyncExecutor<S, R, B, A, C>
where
    S: JobStore,
    R: ConnectionRegistry,
    B: BillingResolver,
    A: AuditSink,
    C: ConnectorExecution,
{
    pub fn new(store: S, registry: R, resolver: B, audit: A, connector: C) -> Self {
        Self {
            store,
            registry,
            resolver,
            audit,
            connector,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Run one cycle: claim up to `max_jobs` jobs (fresh queue first, then
    /// due retries) and drive each to its next state.
    pub fn run_cycle(&self, now: DateTime<Utc>, max_jobs: usize) -> Result<CycleStats, EngineError> {
        let mut stats = CycleStats::default();

        let queued = self.store.claim_queued(max_jobs, now)?;
        stats.queued_claimed = queued.len();

        let remaining = max_jobs.saturating_sub(queued.len());
        let retries = self.store.claim_due_retries(remaining, now)?;
        stats.retries_claimed = retries.len();

        for job in queued.into_iter().chain(retries) {
            self.process(&job, now, &mut stats)?;
        }

        info!(
            queued = stats.queued_claimed,
            retries = stats.retries_claimed,
            succeeded = stats.succeeded,
            retried = stats.retried,
            dead_lettered = stats.dead_lettered,
            failed = stats.failed,
            blocked = stats.blocked,
            "executor cycle complete"
        );
        Ok(stats)
    }

    fn process(
        &self,
        job: &Job,
        now: DateTime<Utc>,
        stats: &mut CycleStats,
    ) -> Result<(), EngineError> {
        // Run-time gate check; billing may have degraded since dispatch.
        let snapshot = self.resolver.resolve_closed(job.tenant_id);
        let gate = check_job_gate(&snapshot, job.category);
        if !gate.allowed {
            if self.store.mark_blocked(job.id, gate.billing_state, now)? {
                stats.blocked += 1;
                self.audit.emit(
                    AuditEvent::new(job.tenant_id, AuditAction::BlockedDueToBilling, now)
                        .with_job(job.id)
                        .with_connection(job.connection_id)
                        .with_metadata(serde_json::json!({
                            "billing_state": gate.billing_state.as_str(),
                            "reason": gate.reason,
                        })),
                );
            }
            return Ok(());
        }
        if gate.should_warn {
            warn!(
                tenant_id = %job.tenant_id,
                job_id = %job.id,
                billing_state = %gate.billing_state,
                "running premium job for tenant with degraded billing state"
            );
        }

        // Started is recorded only once the gate has let the job through,
        // so a parked job's trail reads blocked, not started-then-blocked.
        self.audit.emit(
            AuditEvent::new(job.tenant_id, AuditAction::Started, now)
                .with_job(job.id)
                .with_connection(job.connection_id),
        );

        match self.connector.execute(job) {
            SyncOutcome::Success => {
                // A false return means the job was cancelled mid-flight;
                // leave the connection's sync clock untouched.
                if self.store.mark_success(job.id, now)? {
                    stats.succeeded += 1;
                    if let Err(err) = self.registry.record_sync_success(job.connection_id, now)
                    {
                        warn!(
                            connection_id = %job.connection_id,
                            error = %err,
                            "failed to record sync success on connection"
                        );
                    }
                    self.audit.emit(
                        AuditEvent::new(job.tenant_id, AuditAction::Completed, now)
                            .with_job(job.id)
                            .with_connection(job.connection_id),
                    );
                }
            }
            SyncOutcome::Failure { kind, message } => {
                self.handle_failure(job, kind, &message, now, stats)?;
            }
        }
        Ok(())
    }

    fn handle_failure(
        &self,
        job: &Job,
        kind: wareflow_jobs::SyncErrorKind,
        message: &str,
        now: DateTime<Utc>,
        stats: &mut CycleStats,
    ) -> Result<(), EngineError> {
        match self.retry_policy.decide(kind, job.id, job.retry_count, now) {
            RetryDecision::Retry { at } => {
                if self.store.mark_retrying(job.id, message, at)? {
                    stats.retried += 1;
                    self.audit.emit(
                        AuditEvent::new(job.tenant_id, AuditAction::RetryScheduled, now)
                            .with_job(job.id)
                            .with_connection(job.connection_id)
                            .with_metadata(serde_json::json!({
                                "retry_count": job.retry_count + 1,
                                "next_retry_at": at,
                                "error_kind": kind,
                            })),
                    );
                }
            }
            RetryDecision::DeadLetter { reason } => {
                if self.store.mark_failed(job.id, message, Some(reason), now)? {
                    stats.dead_lettered += 1;
                    self.audit.emit(
                        AuditEvent::new(job.tenant_id, AuditAction::Failed, now)
                            .with_job(job.id)
                            .with_connection(job.connection_id)
                            .with_metadata(serde_json::json!({"error_kind": kind})),
                    );
                    self.audit.emit(
                        AuditEvent::new(job.tenant_id, AuditAction::DeadLettered, now)
                            .with_job(job.id)
                            .with_connection(job.connection_id)
                            .with_metadata(serde_json::json!({"reason": reason})),
                    );
                }
            }
            RetryDecision::Terminal => {
                if self.store.mark_failed(job.id, message, None, now)? {
                    stats.failed += 1;
                    self.audit.emit(
                        AuditEvent::new(job.tenant_id, AuditAction::Failed, now)
                            .with_job(job.id)
                            .with_connection(job.connection_id)
                            .with_metadata(serde_json::json!({"error_kind": kind})),
                    );
                }
            }
        }
        Ok(())
    }
}
