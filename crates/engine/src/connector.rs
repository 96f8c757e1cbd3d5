//! Connector execution seam.
//!
//! The engine does not know how to talk to Shopify or Klaviyo; it hands a
//! claimed job to a [`ConnectorExecution`] and classifies the outcome.
//! Connectors report failures by kind so the retry policy can tell a rate
//! limit from a revoked token from a misconfigured mapping.

use wareflow_jobs::{Job, SyncErrorKind};

/// What happened when a connector ran a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    Failure {
        kind: SyncErrorKind,
        message: String,
    },
}

impl SyncOutcome {
    pub fn failure(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }
}

/// Runs the actual data movement for one job.
///
/// Implementations must not touch the job store; state transitions belong
/// to the executor.
pub trait ConnectorExecution: Send + Sync {
    fn execute(&self, job: &Job) -> SyncOutcome;
}

impl<F> ConnectorExecution for F
where
    F: Fn(&Job) -> SyncOutcome + Send + Sync,
{
    fn execute(&self, job: &Job) -> SyncOutcome {
        self(job)
    }
}
