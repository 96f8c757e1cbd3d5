//! Sync job tracking with retry, backoff, and dead-letter handling.
//!
//! ## Design
//!
//! - Jobs are tenant-scoped and tied to exactly one connection
//! - At most one active job per connection (enforced at enqueue, inside the
//!   store's critical section)
//! - Error-aware retry policy: exponential backoff for transient failures,
//!   a single retry for authentication failures, none for validation
//! - Dead-letter annotation on terminal failures for operator triage
//! - Billing-blocked jobs are parked, not failed, and resume on recovery
//!
//! ## Components
//!
//! - `Job`: the job row and its state machine
//! - `RetryPolicy`: failure classification → retry/dead-letter decision
//! - `JobStore`: persistence seam (in-memory implementation included); a
//!   durable backend must honor the same atomicity contract

pub mod store;
pub mod types;

pub use store::{FailureSummary, InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    DeadLetterReason, Job, JobCategory, JobStatus, RetryDecision, RetryPolicy, SyncErrorKind,
    MAX_ERROR_MESSAGE_LEN,
};
