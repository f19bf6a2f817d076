//! Scheduler types.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};

use crate::Job;

/// Mutable scheduling state for one registered job.
pub(crate) struct ScheduleEntry {
    pub job: Arc<dyn Job>,
    /// Fixed cadence. Zero or negative makes the job due on every tick.
    pub interval: Duration,
    /// When the most recent execution finished.
    pub last_run: Option<DateTime<Utc>>,
    /// When the job next becomes due.
    pub next_run: DateTime<Utc>,
    /// Whether an execution is in flight.
    pub running: bool,
}

impl ScheduleEntry {
    pub fn new(job: Arc<dyn Job>, interval: Duration, next_run: DateTime<Utc>) -> Self {
        Self {
            job,
            interval,
            last_run: None,
            next_run,
            running: false,
        }
    }

    /// Idle and past its due time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.running && now >= self.next_run
    }

    /// Mark the entry as running. Returns false if it already was.
    pub fn begin(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        true
    }

    /// Record a finished execution.
    ///
    /// The next run is measured from completion, so an overrunning job drifts
    /// instead of firing back-to-back to catch up.
    pub fn complete(&mut self, completed_at: DateTime<Utc>) {
        self.running = false;
        self.last_run = Some(completed_at);
        self.next_run = offset(completed_at, self.interval);
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            interval: self.interval,
            last_run: self.last_run,
            next_run: self.next_run,
            running: self.running,
        }
    }
}

/// `at + interval`, clamped to the representable range.
pub(crate) fn offset(at: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    match at.checked_add_signed(interval) {
        Some(t) => t,
        None if interval < Duration::zero() => DateTime::<Utc>::MIN_UTC,
        None => DateTime::<Utc>::MAX_UTC,
    }
}

/// Point-in-time view of one job's schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    #[serde(rename = "interval_secs", serialize_with = "serialize_secs")]
    pub interval: Duration,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
    pub running: bool,
}

fn serialize_secs<S: Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(interval.num_milliseconds() as f64 / 1000.0)
}

/// Outcome of asking the scheduler to start a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// A new execution was launched.
    Started,
    /// An execution was already in flight; nothing new was started.
    AlreadyRunning,
    /// The concurrency budget is exhausted; nothing was started.
    AtCapacity,
}

impl Dispatch {
    pub fn is_started(self) -> bool {
        self == Dispatch::Started
    }
}
