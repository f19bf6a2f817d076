//! In-process recurring job scheduler for Cadence.
//!
//! This crate provides a scheduler that:
//! - Runs named jobs on a fixed interval, measured from the end of the previous run
//! - Bounds the number of simultaneous executions with a global admission gate
//! - Never runs two executions of the same job at once
//! - Enforces a per-execution timeout through a cancellation-aware context
//! - Supports operator-triggered runs and point-in-time status snapshots
//! - Drains in-flight executions on shutdown instead of cancelling them

mod clock;
mod config;
mod error;
mod governor;
mod job;
mod registry;
mod scheduler;
mod types;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::SchedulerConfig;
pub use error::{JobError, SchedulerError};
pub use governor::{Governor, Permit};
pub use job::{FnJob, Job, JobContext, Trigger, job_fn};
pub use scheduler::Scheduler;
pub use types::{Dispatch, JobStatus};
