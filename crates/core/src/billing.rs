//! Billing vocabulary shared by the entitlement gate and the SLA resolver.
//!
//! The billing-plan source of truth lives outside this engine; these types
//! are the snapshot shape it hands back. A snapshot is resolved fresh at
//! every gate check so decisions never act on stale billing data.

use serde::{Deserialize, Serialize};

/// Billing state of a tenant's subscription at resolution time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingState {
    /// Subscription paid up.
    Active,
    /// Payment overdue, still within the dunning window.
    PastDue,
    /// Past the dunning window; account frozen pending payment.
    GracePeriod,
    /// Subscription cancelled by the tenant.
    Canceled,
    /// Subscription lapsed.
    Expired,
    /// No subscription on record, or resolution failed (fail closed).
    None,
}

impl BillingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingState::Active => "active",
            BillingState::PastDue => "past_due",
            BillingState::GracePeriod => "grace_period",
            BillingState::Canceled => "canceled",
            BillingState::Expired => "expired",
            BillingState::None => "none",
        }
    }
}

impl core::fmt::Display for BillingState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription plan tier.
///
/// Tiers map to sync-frequency SLAs (lowest tier = longest interval); the
/// table itself lives in the entitlements crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Growth,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Parse a plan name as reported by the billing provider.
    ///
    /// Unknown names return `None`; callers fall back to the most
    /// restrictive tier rather than guessing.
    pub fn from_plan_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "free" => Some(PlanTier::Free),
            "growth" => Some(PlanTier::Growth),
            "pro" => Some(PlanTier::Pro),
            "enterprise" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Growth => "growth",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

impl core::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time billing resolution for a tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSnapshot {
    pub state: BillingState,
    /// Active plan tier, when one could be resolved.
    pub plan: Option<PlanTier>,
}

impl BillingSnapshot {
    pub fn new(state: BillingState, plan: Option<PlanTier>) -> Self {
        Self { state, plan }
    }

    /// The snapshot used when billing resolution fails: no subscription,
    /// no plan. Premium work is denied under it.
    pub fn closed() -> Self {
        Self {
            state: BillingState::None,
            plan: None,
        }
    }

    pub fn active(plan: PlanTier) -> Self {
        Self {
            state: BillingState::Active,
            plan: Some(plan),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_names_parse_case_insensitively() {
        assert_eq!(PlanTier::from_plan_name("Pro"), Some(PlanTier::Pro));
        assert_eq!(PlanTier::from_plan_name("  GROWTH "), Some(PlanTier::Growth));
        assert_eq!(PlanTier::from_plan_name("platinum"), None);
    }

    #[test]
    fn closed_snapshot_has_no_plan() {
        let snap = BillingSnapshot::closed();
        assert_eq!(snap.state, BillingState::None);
        assert!(snap.plan.is_none());
    }

    #[test]
    fn billing_state_serializes_snake_case() {
        let json = serde_json::to_string(&BillingState::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
    }
}
