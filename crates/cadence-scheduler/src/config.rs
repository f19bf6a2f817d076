//! Scheduler configuration.

use std::time::Duration;

use crate::SchedulerError;

const DEFAULT_MAX_CONCURRENT: usize = 4;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 300;
const DEFAULT_TICK_MILLIS: u64 = 1000;

/// Configuration fixed for the lifetime of a [`Scheduler`](crate::Scheduler).
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use cadence_scheduler::SchedulerConfig;
///
/// let config = SchedulerConfig::default()
///     .max_concurrent(8)
///     .job_timeout(Duration::from_secs(60));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on simultaneously running executions across all jobs.
    pub max_concurrent: usize,

    /// Timeout applied to every execution.
    pub job_timeout: Duration,

    /// How often the scheduling loop scans for due jobs.
    ///
    /// Bounds scheduling jitter: a job due between two ticks starts on the
    /// later one.
    pub tick: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            tick: Duration::from_millis(DEFAULT_TICK_MILLIS),
        }
    }
}

impl SchedulerConfig {
    /// Config with the given concurrency budget and timeout, default tick.
    pub fn new(max_concurrent: usize, job_timeout: Duration) -> Self {
        Self {
            max_concurrent,
            job_timeout,
            ..Self::default()
        }
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_concurrent == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }

        if self.tick.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "tick must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
