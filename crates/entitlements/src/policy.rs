//! The billing gate: which job categories may run under which billing
//! states.
//!
//! Ordinary sync work always runs regardless of billing health; data
//! freshness is never held hostage to a payment failure. Premium
//! categories (exports, AI enrichment, heavy recompute) are where the
//! gate bites.

use serde::Serialize;

use wareflow_core::{BillingSnapshot, BillingState, PlanTier};
use wareflow_jobs::JobCategory;

/// Outcome of gating one job category against a billing snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateDecision {
    pub allowed: bool,
    /// Allowed, but the tenant should be nudged about their billing state.
    pub should_warn: bool,
    pub billing_state: BillingState,
    pub plan: Option<PlanTier>,
    /// Human-readable block reason, set iff `allowed` is false.
    pub reason: Option<String>,
}

impl GateDecision {
    fn allow(snapshot: &BillingSnapshot) -> Self {
        Self {
            allowed: true,
            should_warn: false,
            billing_state: snapshot.state,
            plan: snapshot.plan,
            reason: None,
        }
    }

    fn warn(snapshot: &BillingSnapshot) -> Self {
        Self {
            should_warn: true,
            ..Self::allow(snapshot)
        }
    }

    fn block(snapshot: &BillingSnapshot, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            should_warn: false,
            billing_state: snapshot.state,
            plan: snapshot.plan,
            reason: Some(reason.into()),
        }
    }
}

/// Decide whether `category` may run for a tenant in the given billing
/// state. The full policy table lives in this one match.
pub fn check_job_gate(snapshot: &BillingSnapshot, category: JobCategory) -> GateDecision {
    if !category.is_premium() {
        return GateDecision::allow(snapshot);
    }

    match snapshot.state {
        BillingState::Active => GateDecision::allow(snapshot),
        BillingState::PastDue => GateDecision::warn(snapshot),
        BillingState::GracePeriod => GateDecision::block(
            snapshot,
            format!("{category} jobs are paused while the subscription is in its grace period"),
        ),
        BillingState::Canceled => GateDecision::block(
            snapshot,
            format!("{category} jobs require an active subscription (currently canceled)"),
        ),
        BillingState::Expired => GateDecision::block(
            snapshot,
            format!("{category} jobs require an active subscription (currently expired)"),
        ),
        BillingState::None => GateDecision::block(
            snapshot,
            format!("{category} jobs require a subscription"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: BillingState) -> BillingSnapshot {
        BillingSnapshot::new(state, Some(PlanTier::Pro))
    }

    #[test]
    fn ordinary_jobs_always_run() {
        for state in [
            BillingState::Active,
            BillingState::PastDue,
            BillingState::GracePeriod,
            BillingState::Canceled,
            BillingState::Expired,
            BillingState::None,
        ] {
            let d = check_job_gate(&snapshot(state), JobCategory::Ordinary);
            assert!(d.allowed, "ordinary should run under {state}");
            assert!(!d.should_warn);
        }
    }

    #[test]
    fn premium_allowed_when_active() {
        let d = check_job_gate(&snapshot(BillingState::Active), JobCategory::Exports);
        assert!(d.allowed);
        assert!(!d.should_warn);
    }

    #[test]
    fn premium_warns_when_past_due() {
        let d = check_job_gate(&snapshot(BillingState::PastDue), JobCategory::Ai);
        assert!(d.allowed);
        assert!(d.should_warn);
    }

    #[test]
    fn premium_blocked_when_delinquent() {
        for state in [
            BillingState::GracePeriod,
            BillingState::Canceled,
            BillingState::Expired,
            BillingState::None,
        ] {
            let d = check_job_gate(&snapshot(state), JobCategory::HeavyRecompute);
            assert!(!d.allowed, "premium should be blocked under {state}");
            assert!(d.reason.is_some());
        }
    }
}
