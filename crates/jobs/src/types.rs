//! Core job types and retry policies.

use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wareflow_core::{BillingState, ConnectionId, JobId, TenantId};

/// Error messages are capped before storage so an adversarial connector
/// payload cannot flood the store or the audit trail.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Job category for premium gating.
///
/// Only the entitlement gate looks at this: `Ordinary` jobs keep data
/// minimally fresh regardless of billing state, premium categories are
/// denied the moment billing leaves the active/past-due window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobCategory {
    /// Non-premium work (scheduled syncs).
    Ordinary,
    Exports,
    Ai,
    HeavyRecompute,
}

impl JobCategory {
    pub fn is_premium(&self) -> bool {
        !matches!(self, JobCategory::Ordinary)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobCategory::Ordinary => "ordinary",
            JobCategory::Exports => "exports",
            JobCategory::Ai => "ai",
            JobCategory::HeavyRecompute => "heavy_recompute",
        }
    }
}

impl core::fmt::Display for JobCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting to be claimed by an executor.
    Queued,
    /// Claimed and executing.
    Running,
    /// Completed successfully.
    Success,
    /// Terminal failure; `dead_letter_reason` distinguishes dead-lettered
    /// jobs from immediate terminal failures.
    Failed,
    /// Waiting for `next_retry_at` to elapse, then re-enters `Running`.
    Retrying,
    /// Parked because billing denied execution; resumed by the recovery
    /// retrier once billing returns to active.
    BlockedDueToBilling,
    /// Cancelled by an operator.
    Cancelled,
    /// Action/insight job family only: some but not all units succeeded.
    PartiallySucceeded,
}

impl JobStatus {
    /// Terminal states are never overwritten; later transition attempts
    /// against them are no-ops.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success
                | JobStatus::Failed
                | JobStatus::Cancelled
                | JobStatus::PartiallySucceeded
        )
    }

    /// Active for the one-job-per-connection isolation check.
    ///
    /// `Retrying` counts: a scheduled retry will re-enter `Running`, so a
    /// fresh dispatch alongside it could end with two concurrent syncs for
    /// the same connection.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Queued | JobStatus::Running | JobStatus::Retrying
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
            JobStatus::BlockedDueToBilling => "blocked_due_to_billing",
            JobStatus::Cancelled => "cancelled",
            JobStatus::PartiallySucceeded => "partially_succeeded",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classification as reported by the connector execution layer.
///
/// The engine never inspects platform errors beyond this category.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Network / rate-limit / 5xx-equivalent. Retried with backoff.
    Transient,
    /// Expired or revoked credential. Retried once (the credential may have
    /// just been refreshed), then dead-lettered.
    Authentication,
    /// Bad configuration. Never retryable.
    Validation,
}

impl SyncErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorKind::Transient => "transient",
            SyncErrorKind::Authentication => "authentication",
            SyncErrorKind::Validation => "validation",
        }
    }
}

impl core::fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job was dead-lettered. Lets operators distinguish "needs a
/// reconnect" from plain retry exhaustion without reading error strings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Transient failures exhausted `max_retries`.
    RetryExhausted,
    /// Authentication kept failing after its single retry; the tenant must
    /// reconnect the source.
    NeedsReconnect,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::RetryExhausted => "retry_exhausted",
            DeadLetterReason::NeedsReconnect => "needs_reconnect",
        }
    }
}

impl core::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt at the given time.
    Retry { at: DateTime<Utc> },
    /// Terminal failure annotated for operator triage.
    DeadLetter { reason: DeadLetterReason },
    /// Terminal failure with no retries (validation errors).
    Terminal,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts for transient failures (0 = no retries).
    pub max_retries: u32,
    /// Base backoff delay.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Jitter factor (0.0-1.0) applied as ± around the computed delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Exponential backoff with jitter for a given retry count (0-indexed:
    /// the delay before retry N+1 after N prior retries).
    ///
    /// Jitter is deterministic pseudo-random, keyed by job id and attempt:
    /// concurrent jobs still spread out (no thundering-herd re-dispatch)
    /// while tests stay reproducible.
    pub fn delay_for_retry(&self, job_id: JobId, retry_count: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let exp = 2_f64.powi(retry_count.min(30) as i32);
        let delay_ms = (base_ms * exp).min(max_ms);

        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            let mut hasher = std::hash::DefaultHasher::new();
            job_id.as_uuid().hash(&mut hasher);
            retry_count.hash(&mut hasher);
            let fraction = (hasher.finish() % 1000) as f64 / 1000.0;
            jitter_range * (fraction - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    /// Decide retry vs. dead-letter vs. terminal-fail for a classified
    /// failure. `retry_count` is the number of retries already consumed.
    pub fn decide(
        &self,
        kind: SyncErrorKind,
        job_id: JobId,
        retry_count: u32,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        match kind {
            SyncErrorKind::Validation => RetryDecision::Terminal,
            SyncErrorKind::Authentication => {
                if retry_count == 0 {
                    RetryDecision::Retry {
                        at: now
                            + chrono::Duration::from_std(self.base_delay).unwrap_or_default(),
                    }
                } else {
                    RetryDecision::DeadLetter {
                        reason: DeadLetterReason::NeedsReconnect,
                    }
                }
            }
            SyncErrorKind::Transient => {
                if retry_count < self.max_retries {
                    let delay = self.delay_for_retry(job_id, retry_count);
                    RetryDecision::Retry {
                        at: now + chrono::Duration::from_std(delay).unwrap_or_default(),
                    }
                } else {
                    RetryDecision::DeadLetter {
                        reason: DeadLetterReason::RetryExhausted,
                    }
                }
            }
        }
    }
}

/// Truncate an error message to the storage cap.
pub fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_ERROR_MESSAGE_LEN {
        message.to_string()
    } else {
        let mut end = MAX_ERROR_MESSAGE_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message[..end].to_string()
    }
}

/// A sync job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub connection_id: ConnectionId,
    pub category: JobCategory,
    pub status: JobStatus,

    /// Retries already consumed (billing-recovery retries included).
    pub retry_count: u32,
    /// Cap for transient-failure retries.
    pub max_retries: u32,
    /// When a `Retrying` job becomes claimable again.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// When the job was parked for billing, and the state that parked it.
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_billing_state: Option<BillingState>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Sanitized, length-capped failure detail.
    pub error_message: Option<String>,
    pub dead_letter_reason: Option<DeadLetterReason>,
    /// Opaque structured context (e.g. trigger source).
    pub metadata: serde_json::Value,
}

impl Job {
    /// Create a new queued job. Isolation is the store's concern, not the
    /// constructor's.
    pub fn new(
        tenant_id: TenantId,
        connection_id: ConnectionId,
        category: JobCategory,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            tenant_id,
            connection_id,
            category,
            status: JobStatus::Queued,
            retry_count: 0,
            max_retries: RetryPolicy::default().max_retries,
            next_retry_at: None,
            blocked_at: None,
            blocked_billing_state: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
            dead_letter_reason: None,
            metadata,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Claimed by an executor.
    pub(crate) fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.started_at = Some(now);
        self.next_retry_at = None;
    }

    pub(crate) fn mark_success(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Success;
        self.completed_at = Some(now);
        self.error_message = None;
    }

    /// Schedule a retry: consumes one retry and parks until `at`.
    pub(crate) fn mark_retrying(&mut self, error: &str, at: DateTime<Utc>) {
        self.status = JobStatus::Retrying;
        self.retry_count += 1;
        self.next_retry_at = Some(at);
        self.error_message = Some(truncate_error(error));
    }

    pub(crate) fn mark_failed(
        &mut self,
        error: &str,
        reason: Option<DeadLetterReason>,
        now: DateTime<Utc>,
    ) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(now);
        self.error_message = Some(truncate_error(error));
        self.dead_letter_reason = reason;
    }

    pub(crate) fn mark_blocked(&mut self, billing_state: BillingState, now: DateTime<Utc>) {
        self.status = JobStatus::BlockedDueToBilling;
        self.blocked_at = Some(now);
        self.blocked_billing_state = Some(billing_state);
    }

    /// Billing recovered: back into the retry path. Clears the block
    /// bookkeeping and consumes one retry.
    pub(crate) fn unblock_for_retry(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Retrying;
        self.retry_count += 1;
        self.blocked_at = None;
        self.blocked_billing_state = None;
        self.next_retry_at = Some(now);
    }

    pub(crate) fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now);
    }

    pub fn is_dead_lettered(&self) -> bool {
        self.status == JobStatus::Failed && self.dead_letter_reason.is_some()
    }
}
