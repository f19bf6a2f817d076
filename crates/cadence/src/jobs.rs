//! Built-in maintenance jobs.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::info;

use cadence_scheduler::{Job, JobContext, JobError};

/// Logs that the worker is alive, with a beat counter and uptime.
pub struct HeartbeatJob {
    beats: AtomicU64,
    started: Instant,
}

impl HeartbeatJob {
    pub fn new() -> Self {
        Self {
            beats: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    #[cfg(test)]
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

impl Default for HeartbeatJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Job for HeartbeatJob {
    fn name(&self) -> &str {
        "heartbeat"
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        ctx.check()?;
        let beat = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            beat,
            uptime_secs = self.started.elapsed().as_secs(),
            trigger = %ctx.trigger(),
            "heartbeat"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_scheduler::Trigger;
    use std::time::Duration;

    #[tokio::test]
    async fn test_heartbeat_counts_beats() {
        let job = HeartbeatJob::new();
        for _ in 0..3 {
            let ctx = JobContext::new(job.name(), Trigger::Schedule, Duration::from_secs(1));
            job.run(ctx).await.unwrap();
        }
        assert_eq!(job.beats(), 3);
    }
}
