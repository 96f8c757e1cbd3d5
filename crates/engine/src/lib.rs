//! The sync engine: sweep, dispatch, execute, recover.
//!
//! ## Design
//!
//! Four components share one [`JobStore`](wareflow_jobs::JobStore) and one
//! [`BillingResolver`](wareflow_entitlements::BillingResolver):
//!
//! - [`SchedulerSweep`] walks enabled connections and dispatches jobs for
//!   the ones whose plan SLA says they are due
//! - [`JobDispatcher`] is the single enqueue path, enforcing the
//!   one-active-job-per-connection invariant via the store
//! - [`SyncExecutor`] claims jobs, re-checks the billing gate at run time,
//!   runs the connector, and applies the retry policy to failures
//! - [`RecoveryRetrier`] revives billing-blocked jobs once a tenant's
//!   subscription returns to good standing
//!
//! All components take `now` explicitly; nothing here reads the wall
//! clock, which keeps cycle behavior reproducible in tests.

pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod recovery;
pub mod registry;
pub mod sweep;

pub use connector::{ConnectorExecution, SyncOutcome};
pub use dispatcher::{DispatchError, JobDispatcher};
pub use error::EngineError;
pub use executor::{CycleStats, SyncExecutor};
pub use recovery::{RecoveryReport, RecoveryRetrier, DEFAULT_MAX_AUTO_RETRIES};
pub use registry::{ConnectionRegistry, InMemoryConnectionRegistry, RegistryError};
pub use sweep::{SchedulerSweep, SweepStats, DEFAULT_SWEEP_BATCH_LIMIT};
