//! Plan-tier sync SLAs: how often each plan's connections get refreshed.

use chrono::{DateTime, Duration, Utc};

use wareflow_core::PlanTier;

/// Interval used when the plan is unknown: the most restrictive tier, so
/// a missing plan never grants more frequent syncs than the lowest tier.
pub const DEFAULT_INTERVAL_MINUTES: i64 = 1440;

/// Minimum minutes between scheduled syncs for a plan.
pub fn interval_minutes(plan: Option<PlanTier>) -> i64 {
    match plan {
        Some(PlanTier::Free) => 1440,
        Some(PlanTier::Growth) => 360,
        Some(PlanTier::Pro) | Some(PlanTier::Enterprise) => 60,
        None => DEFAULT_INTERVAL_MINUTES,
    }
}

/// Whether a connection is due for a sync. Never-synced connections are
/// always due.
pub fn is_due(
    last_sync_at: Option<DateTime<Utc>>,
    interval_minutes: i64,
    now: DateTime<Utc>,
) -> bool {
    match last_sync_at {
        None => true,
        Some(last) => now - last >= Duration::minutes(interval_minutes),
    }
}
