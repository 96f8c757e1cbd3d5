//! Job storage: the persistence seam and its in-memory implementation.
//!
//! The store is the only shared mutable resource in the engine. Sweepers,
//! executors, and the recovery retrier coordinate exclusively through it,
//! so two operations carry an atomicity contract any backend must honor:
//!
//! - `enqueue` is check-and-insert: the active-job-per-connection check and
//!   the insert happen in one critical section
//! - the `claim_*` operations are claim-and-mark-running: no two executors
//!   can claim the same job
//!
//! All transition writes check the current status first; a job that reached
//! a terminal state (e.g. cancelled by an operator mid-flight) is never
//! overwritten, the write becomes a no-op.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use wareflow_core::{BillingState, ConnectionId, JobId, TenantId};

use super::types::{DeadLetterReason, Job, JobStatus};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    /// Enqueue a new job, enforcing the isolation invariant: fails with
    /// `ActiveJobExists` when the connection already has an active job.
    fn enqueue(&self, job: Job) -> Result<Job, JobStoreError>;

    /// Get a job by ID, scoped to a tenant.
    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Atomically claim up to `limit` queued jobs (oldest first), marking
    /// each `Running`.
    fn claim_queued(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError>;

    /// Atomically claim up to `limit` retrying jobs whose `next_retry_at`
    /// has elapsed (oldest first), marking each `Running`.
    fn claim_due_retries(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// Transition to `Success`. Returns false (no-op) if the job is already
    /// terminal.
    fn mark_success(&self, job_id: JobId, now: DateTime<Utc>) -> Result<bool, JobStoreError>;

    /// Transition to `Retrying` with the given resume time; consumes one
    /// retry. No-op on terminal jobs.
    fn mark_retrying(
        &self,
        job_id: JobId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, JobStoreError>;

    /// Transition to `Failed`, optionally annotated as dead-lettered.
    /// No-op on terminal jobs.
    fn mark_failed(
        &self,
        job_id: JobId,
        error: &str,
        reason: Option<DeadLetterReason>,
        now: DateTime<Utc>,
    ) -> Result<bool, JobStoreError>;

    /// Park the job as `BlockedDueToBilling`. No-op on terminal jobs.
    fn mark_blocked(
        &self,
        job_id: JobId,
        billing_state: BillingState,
        now: DateTime<Utc>,
    ) -> Result<bool, JobStoreError>;

    /// Move a `BlockedDueToBilling` job back into the retry path.
    /// Returns false for jobs in any other state, and also when the
    /// connection already holds another active job — revival re-enters
    /// the active pool, so it honors the same isolation check as
    /// `enqueue` and is deferred to a later sweep.
    fn unblock_for_retry(&self, job_id: JobId, now: DateTime<Utc>) -> Result<bool, JobStoreError>;

    /// Operator cancel. No-op on terminal jobs.
    fn cancel(&self, job_id: JobId, now: DateTime<Utc>) -> Result<bool, JobStoreError>;

    /// The active (queued/running/retrying) job for a connection, if any.
    fn active_job_for(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Option<Job>, JobStoreError>;

    /// Tenants that currently hold at least one billing-blocked job.
    fn blocked_tenants(&self) -> Result<Vec<TenantId>, JobStoreError>;

    /// Billing-blocked jobs for a tenant, oldest first.
    fn blocked_jobs(&self, tenant_id: TenantId) -> Result<Vec<Job>, JobStoreError>;

    /// Dead-lettered jobs for a tenant, oldest first.
    fn dead_letters(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Jobs stuck in `Running` since before `cutoff`. Consumed by an
    /// external stale-job reaper; the engine itself never resurrects them.
    fn running_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError>;

    /// Failure summary for a connection, for operator triage surfaces.
    fn failure_summary(
        &self,
        connection_id: ConnectionId,
    ) -> Result<FailureSummary, JobStoreError>;

    /// Per-tenant job counts by status.
    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
///
/// Store errors abort the current cycle only; per-job errors never reach
/// this type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("active job already exists for connection {0}")]
    ActiveJobExists(ConnectionId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("storage error: {0}")]
    Storage(String),
}

/// Per-tenant job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub queued: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
    pub retrying: usize,
    pub blocked: usize,
    pub cancelled: usize,
    /// Subset of `failed` that carries a dead-letter reason.
    pub dead_lettered: usize,
}

/// Failure summary for one connection, suitable for UI display.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailureSummary {
    pub connection_id: ConnectionId,
    pub total_failures: usize,
    pub active_retries: usize,
    pub dead_letter_count: usize,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// In-memory job store.
///
/// Backs tests and single-process dev runs; the lock scope gives it the
/// same atomicity the trait demands from durable backends.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Apply a transition under the write lock, skipping terminal jobs.
    fn transition<F>(&self, job_id: JobId, f: F) -> Result<bool, JobStoreError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if job.status.is_terminal() {
            return Ok(false);
        }
        f(job);
        Ok(true)
    }

    fn claim_where<F>(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        pred: F,
    ) -> Result<Vec<Job>, JobStoreError>
    where
        F: Fn(&Job) -> bool,
    {
        let mut jobs = self.jobs.write().unwrap();

        // Oldest-created-first for fairness; id tie-break keeps the order
        // deterministic within one timestamp.
        let mut candidates: Vec<(DateTime<Utc>, JobId)> = jobs
            .values()
            .filter(|j| pred(j))
            .map(|j| (j.created_at, j.id))
            .collect();
        candidates.sort();
        candidates.truncate(limit);

        let mut claimed = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            if let Some(job) = jobs.get_mut(&id) {
                job.mark_running(now);
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if let Some(existing) = jobs
            .values()
            .find(|j| j.connection_id == job.connection_id && j.status.is_active())
        {
            return Err(JobStoreError::ActiveJobExists(existing.connection_id));
        }
        let stored = job.clone();
        jobs.insert(job.id, job);
        Ok(stored)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        match jobs.get(&job_id) {
            Some(job) if job.tenant_id == tenant_id => Ok(Some(job.clone())),
            Some(_) => Err(JobStoreError::TenantIsolation),
            None => Ok(None),
        }
    }

    fn claim_queued(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        self.claim_where(limit, now, |j| j.status == JobStatus::Queued)
    }

    fn claim_due_retries(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, JobStoreError> {
        self.claim_where(limit, now, |j| {
            j.status == JobStatus::Retrying && j.next_retry_at.is_some_and(|at| at <= now)
        })
    }

    fn mark_success(&self, job_id: JobId, now: DateTime<Utc>) -> Result<bool, JobStoreError> {
        self.transition(job_id, |j| j.mark_success(now))
    }

    fn mark_retrying(
        &self,
        job_id: JobId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, JobStoreError> {
        self.transition(job_id, |j| j.mark_retrying(error, at))
    }

    fn mark_failed(
        &self,
        job_id: JobId,
        error: &str,
        reason: Option<DeadLetterReason>,
        now: DateTime<Utc>,
    ) -> Result<bool, JobStoreError> {
        self.transition(job_id, |j| j.mark_failed(error, reason, now))
    }

    fn mark_blocked(
        &self,
        job_id: JobId,
        billing_state: BillingState,
        now: DateTime<Utc>,
    ) -> Result<bool, JobStoreError> {
        self.transition(job_id, |j| j.mark_blocked(billing_state, now))
    }

    fn unblock_for_retry(&self, job_id: JobId, now: DateTime<Utc>) -> Result<bool, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();

        let job = jobs.get(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if job.status != JobStatus::BlockedDueToBilling {
            return Ok(false);
        }
        // Same isolation check as enqueue, inside the same critical
        // section: a sweep may have dispatched a fresh job for this
        // connection while this one sat blocked.
        let connection_id = job.connection_id;
        if jobs
            .values()
            .any(|j| j.id != job_id && j.connection_id == connection_id && j.status.is_active())
        {
            return Ok(false);
        }

        if let Some(job) = jobs.get_mut(&job_id) {
            job.unblock_for_retry(now);
        }
        Ok(true)
    }

    fn cancel(&self, job_id: JobId, now: DateTime<Utc>) -> Result<bool, JobStoreError> {
        self.transition(job_id, |j| j.mark_cancelled(now))
    }

    fn active_job_for(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        Ok(jobs
            .values()
            .find(|j| j.connection_id == connection_id && j.status.is_active())
            .cloned())
    }

    fn blocked_tenants(&self) -> Result<Vec<TenantId>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        let mut tenants: Vec<TenantId> = jobs
            .values()
            .filter(|j| j.status == JobStatus::BlockedDueToBilling)
            .map(|j| j.tenant_id)
            .collect();
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }

    fn blocked_jobs(&self, tenant_id: TenantId) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        let mut result: Vec<Job> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id && j.status == JobStatus::BlockedDueToBilling)
            .cloned()
            .collect();
        result.sort_by_key(|j| (j.created_at, j.id));
        Ok(result)
    }

    fn dead_letters(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        let mut result: Vec<Job> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id && j.is_dead_lettered())
            .cloned()
            .collect();
        result.sort_by_key(|j| (j.created_at, j.id));
        result.truncate(limit);
        Ok(result)
    }

    fn running_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        let mut result: Vec<Job> = jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Running && j.started_at.is_some_and(|at| at < cutoff)
            })
            .cloned()
            .collect();
        result.sort_by_key(|j| (j.started_at, j.id));
        Ok(result)
    }

    fn failure_summary(
        &self,
        connection_id: ConnectionId,
    ) -> Result<FailureSummary, JobStoreError> {
        let jobs = self.jobs.read().unwrap();

        let mut summary = FailureSummary {
            connection_id,
            total_failures: 0,
            active_retries: 0,
            dead_letter_count: 0,
            last_error: None,
            last_error_at: None,
            next_retry_at: None,
        };

        for job in jobs.values().filter(|j| j.connection_id == connection_id) {
            match job.status {
                JobStatus::Failed => {
                    summary.total_failures += 1;
                    if job.dead_letter_reason.is_some() {
                        summary.dead_letter_count += 1;
                    }
                    if summary.last_error_at.is_none()
                        || job.completed_at > summary.last_error_at
                    {
                        summary.last_error_at = job.completed_at;
                        summary.last_error = job.error_message.clone();
                    }
                }
                JobStatus::Retrying => {
                    summary.active_retries += 1;
                    match (summary.next_retry_at, job.next_retry_at) {
                        (None, Some(at)) => summary.next_retry_at = Some(at),
                        (Some(cur), Some(at)) if at < cur => summary.next_retry_at = Some(at),
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        Ok(summary)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        let mut stats = JobStats::default();

        for job in jobs.values() {
            if job.tenant_id != tenant_id {
                continue;
            }
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Success | JobStatus::PartiallySucceeded => stats.success += 1,
                JobStatus::Failed => {
                    stats.failed += 1;
                    if job.dead_letter_reason.is_some() {
                        stats.dead_lettered += 1;
                    }
                }
                JobStatus::Retrying => stats.retrying += 1,
                JobStatus::BlockedDueToBilling => stats.blocked += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }

        Ok(stats)
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<Job, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(tenant_id, job_id)
    }

    fn claim_queued(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        (**self).claim_queued(limit, now)
    }

    fn claim_due_retries(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).claim_due_retries(limit, now)
    }

    fn mark_success(&self, job_id: JobId, now: DateTime<Utc>) -> Result<bool, JobStoreError> {
        (**self).mark_success(job_id, now)
    }

    fn mark_retrying(
        &self,
        job_id: JobId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, JobStoreError> {
        (**self).mark_retrying(job_id, error, at)
    }

    fn mark_failed(
        &self,
        job_id: JobId,
        error: &str,
        reason: Option<DeadLetterReason>,
        now: DateTime<Utc>,
    ) -> Result<bool, JobStoreError> {
        (**self).mark_failed(job_id, error, reason, now)
    }

    fn mark_blocked(
        &self,
        job_id: JobId,
        billing_state: BillingState,
        now: DateTime<Utc>,
    ) -> Result<bool, JobStoreError> {
        (**self).mark_blocked(job_id, billing_state, now)
    }

    fn unblock_for_retry(&self, job_id: JobId, now: DateTime<Utc>) -> Result<bool, JobStoreError> {
        (**self).unblock_for_retry(job_id, now)
    }

    fn cancel(&self, job_id: JobId, now: DateTime<Utc>) -> Result<bool, JobStoreError> {
        (**self).cancel(job_id, now)
    }

    fn active_job_for(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Option<Job>, JobStoreError> {
        (**self).active_job_for(connection_id)
    }

    fn blocked_tenants(&self) -> Result<Vec<TenantId>, JobStoreError> {
        (**self).blocked_tenants()
    }

    fn blocked_jobs(&self, tenant_id: TenantId) -> Result<Vec<Job>, JobStoreError> {
        (**self).blocked_jobs(tenant_id)
    }

    fn dead_letters(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).dead_letters(tenant_id, limit)
    }

    fn running_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        (**self).running_older_than(cutoff)
    }

    fn failure_summary(
        &self,
        connection_id: ConnectionId,
    ) -> Result<FailureSummary, JobStoreError> {
        (**self).failure_summary(connection_id)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        (**self).stats(tenant_id)
    }
}
