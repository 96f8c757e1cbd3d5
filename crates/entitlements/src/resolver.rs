//! Billing snapshot resolution.
//!
//! The engine never talks to the billing provider directly; it goes
//! through [`BillingResolver`]. When resolution fails the engine treats
//! the tenant as fully delinquent (state `None`, no plan), so premium
//! work is blocked and the SLA falls back to the most restrictive tier.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::warn;

use wareflow_core::{BillingSnapshot, TenantId};

/// Billing resolution failure. The variant split only matters for logs;
/// callers fail closed either way.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BillingResolveError {
    #[error("billing provider unavailable: {0}")]
    Unavailable(String),
    #[error("no billing record for tenant {0}")]
    UnknownTenant(TenantId),
}

/// Source of billing truth for a tenant.
pub trait BillingResolver: Send + Sync {
    fn resolve(&self, tenant_id: TenantId) -> Result<BillingSnapshot, BillingResolveError>;

    /// Resolve, failing closed: errors become a fully delinquent snapshot.
    fn resolve_closed(&self, tenant_id: TenantId) -> BillingSnapshot {
        match self.resolve(tenant_id) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(
                    tenant_id = %tenant_id,
                    error = %err,
                    "billing resolution failed, failing closed"
                );
                BillingSnapshot::closed()
            }
        }
    }
}

/// Fixed-table resolver for tests and single-process dev runs.
#[derive(Debug, Default)]
pub struct StaticBillingResolver {
    snapshots: RwLock<HashMap<TenantId, BillingSnapshot>>,
}

impl StaticBillingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tenant_id: TenantId, snapshot: BillingSnapshot) {
        self.snapshots.write().unwrap().insert(tenant_id, snapshot);
    }
}

impl BillingResolver for StaticBillingResolver {
    fn resolve(&self, tenant_id: TenantId) -> Result<BillingSnapshot, BillingResolveError> {
        self.snapshots
            .read()
            .unwrap()
            .get(&tenant_id)
            .copied()
            .ok_or(BillingResolveError::UnknownTenant(tenant_id))
    }
}

impl<B: BillingResolver + ?Sized> BillingResolver for std::sync::Arc<B> {
    fn resolve(&self, tenant_id: TenantId) -> Result<BillingSnapshot, BillingResolveError> {
        (**self).resolve(tenant_id)
    }
}
