//! Entitlements: billing-state resolution, the job gate, and plan SLAs.
//!
//! ## Design
//!
//! Everything billing-related the engine consults lives here so the gate
//! policy has exactly one authoritative table. The resolver seam keeps the
//! billing provider out of the engine; resolution failures fail closed
//! (treated as fully delinquent) so a billing outage can never grant free
//! premium work.

pub mod policy;
pub mod resolver;
pub mod sla;

pub use policy::{check_job_gate, GateDecision};
pub use resolver::{BillingResolveError, BillingResolver, StaticBillingResolver};
pub use sla::{interval_minutes, is_due, DEFAULT_INTERVAL_MINUTES};
