//! `wareflow-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure
//! concerns): strongly-typed identifiers, the billing vocabulary shared by
//! the entitlement gate and the SLA resolver, and the connection record the
//! scheduler reads.

pub mod billing;
pub mod connection;
pub mod error;
pub mod id;

pub use billing::{BillingSnapshot, BillingState, PlanTier};
pub use connection::{Connection, SyncStatus};
pub use error::{DomainError, DomainResult};
pub use id::{ConnectionId, JobId, TenantId};
