//! Worker entrypoint: runs one engine component as a long-lived process.
//!
//! Usage: `wareflow-workers <sweep|executor|recover>`
//!
//! Each mode loops on its poll interval until SIGINT/SIGTERM, finishing
//! the in-flight cycle before exiting so claimed jobs are never abandoned
//! mid-transition.

mod config;

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use tracing::{info, warn};

use wareflow_audit::TracingAuditSink;
use wareflow_engine::{
    InMemoryConnectionRegistry, RecoveryRetrier, SchedulerSweep, SyncExecutor, SyncOutcome,
};
use wareflow_entitlements::StaticBillingResolver;
use wareflow_jobs::{InMemoryJobStore, Job};

use crate::config::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wareflow_observability::init();

    let mode = std::env::args()
        .nth(1)
        .context("usage: wareflow-workers <sweep|executor|recover>")?;
    let config = WorkerConfig::from_env();
    info!(mode = %mode, ?config, "worker starting");

    // Dev-only wiring. Production deployments swap these for the durable
    // store, the live connection registry, the billing-provider resolver,
    // and real connectors.
    warn!("using in-memory backends; state is lost on restart");
    let store = InMemoryJobStore::arc();
    let registry = Arc::new(InMemoryConnectionRegistry::new());
    let resolver = Arc::new(StaticBillingResolver::new());
    let audit = Arc::new(TracingAuditSink);

    match mode.as_str() {
        "sweep" => {
            let sweep = SchedulerSweep::new(registry, store, resolver, audit)
                .with_batch_limit(config.sweep_batch_limit);
            run_until_shutdown(config.poll_interval, || {
                let stats = sweep.run(Utc::now())?;
                info!(?stats, "sweep pass finished");
                Ok(())
            })
            .await
        }
        "executor" => {
            let connector = |job: &Job| {
                info!(job_id = %job.id, "no connector configured, completing as no-op");
                SyncOutcome::Success
            };
            let executor = SyncExecutor::new(store, registry, resolver, audit, connector);
            run_until_shutdown(config.poll_interval, || {
                let stats = executor.run_cycle(Utc::now(), config.max_jobs_per_cycle)?;
                if stats.processed() > 0 {
                    info!(?stats, "executor cycle finished");
                }
                Ok(())
            })
            .await
        }
        "recover" => {
            let retrier = RecoveryRetrier::new(store, resolver, audit)
                .with_max_auto_retries(config.max_auto_retries);
            run_until_shutdown(config.poll_interval, || {
                let report = retrier.sweep(Utc::now())?;
                if report.revived_count() > 0 {
                    info!(revived = report.revived_count(), "recovery pass finished");
                }
                Ok(())
            })
            .await
        }
        other => bail!("unknown mode {other:?}; expected sweep, executor, or recover"),
    }
}

/// Run `cycle` every `interval` until the process receives SIGINT or
/// SIGTERM. The current cycle always completes before shutdown.
async fn run_until_shutdown<F>(interval: std::time::Duration, mut cycle: F) -> anyhow::Result<()>
where
    F: FnMut() -> anyhow::Result<()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = cycle() {
                    warn!(error = %err, "cycle failed; continuing");
                }
            }
            _ = shutdown_signal() => {
                info!("shutdown signal received, exiting");
                return Ok(());
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
