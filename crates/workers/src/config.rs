//! Worker configuration from environment variables.

use std::time::Duration;

use tracing::warn;

use wareflow_engine::{DEFAULT_MAX_AUTO_RETRIES, DEFAULT_SWEEP_BATCH_LIMIT};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_MAX_JOBS_PER_CYCLE: usize = 5;

/// Runtime knobs shared by all worker modes.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay between cycles.
    pub poll_interval: Duration,
    /// Executor claim budget per cycle.
    pub max_jobs_per_cycle: usize,
    /// Connections evaluated per sweep.
    pub sweep_batch_limit: usize,
    /// Automatic revivals per billing-blocked job.
    pub max_auto_retries: u32,
}

impl WorkerConfig {
    /// Read configuration from the environment, falling back to defaults
    /// (and warning) on missing or unparsable values.
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(env_or(
                "WORKER_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )),
            max_jobs_per_cycle: env_or("WORKER_MAX_JOBS_PER_CYCLE", DEFAULT_MAX_JOBS_PER_CYCLE),
            sweep_batch_limit: env_or("WORKER_SWEEP_BATCH_LIMIT", DEFAULT_SWEEP_BATCH_LIMIT),
            max_auto_retries: env_or("WORKER_MAX_AUTO_RETRIES", DEFAULT_MAX_AUTO_RETRIES),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_jobs_per_cycle: DEFAULT_MAX_JOBS_PER_CYCLE,
            sweep_batch_limit: DEFAULT_SWEEP_BATCH_LIMIT,
            max_auto_retries: DEFAULT_MAX_AUTO_RETRIES,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T
where
    T: std::fmt::Display + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = %default, "unparsable env var, using default");
            default
        }),
        Err(_) => default,
    }
}
