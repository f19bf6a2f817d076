//! The job abstraction and its execution context.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::JobError;

/// A named unit of recurring work.
///
/// The scheduler never looks inside a job; it only calls [`Job::run`] and
/// records when it finished. `run` is awaited on its own task, so blocking
/// work belongs in `tokio::task::spawn_blocking`.
#[async_trait]
pub trait Job: Send + Sync {
    /// Unique name; registering a second job with the same name replaces the first.
    fn name(&self) -> &str;

    /// Execute the job once.
    ///
    /// Long-running jobs should watch [`JobContext::cancelled`] and return
    /// promptly once the execution's timeout fires.
    ///
    /// On timeout the job's task is aborted, which only takes effect at an
    /// await point. Work stuck in a CPU-bound loop or inside
    /// `spawn_blocking` keeps running after the timeout, and after
    /// [`Scheduler::stop`](crate::Scheduler::stop) has returned, unless it
    /// checks [`JobContext::is_cancelled`] itself.
    async fn run(&self, ctx: JobContext) -> Result<(), JobError>;
}

/// What caused an execution to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The job came due on a scheduler tick.
    Schedule,
    /// An operator asked for it via `run_now`.
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Schedule => write!(f, "schedule"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Per-execution context handed to [`Job::run`].
///
/// Cancelled when the execution exceeds the scheduler's job timeout.
/// Scheduler shutdown does not cancel it.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_name: Arc<str>,
    trigger: Trigger,
    deadline: Instant,
    cancellation_token: CancellationToken,
}

impl JobContext {
    /// Create a context whose deadline is `timeout` from now.
    ///
    /// The scheduler builds one of these per execution; it is public so jobs
    /// can be exercised directly in tests.
    pub fn new(job_name: impl Into<Arc<str>>, trigger: Trigger, timeout: Duration) -> Self {
        Self {
            job_name: job_name.into(),
            trigger,
            deadline: Instant::now() + timeout,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// When the execution will be cancelled.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Resolves once the execution has been cancelled.
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await
    }

    /// Return [`JobError::Cancelled`] if the execution has been cancelled.
    ///
    /// Convenient between steps of a long job: `ctx.check()?;`
    pub fn check(&self) -> Result<(), JobError> {
        if self.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// A token cancelled together with this execution, for sub-tasks the job spawns.
    pub fn child_token(&self) -> CancellationToken {
        self.cancellation_token.child_token()
    }

    pub(crate) fn cancel(&self) {
        self.cancellation_token.cancel();
    }
}

/// A [`Job`] backed by an async closure.
pub struct FnJob<F> {
    name: String,
    run: F,
}

/// Build a job from a name and an async closure.
///
/// ```rust
/// use cadence_scheduler::{JobError, job_fn};
///
/// let job = job_fn("session-cleanup", |_ctx| async { Ok::<(), JobError>(()) });
/// ```
pub fn job_fn<F, Fut>(name: impl Into<String>, run: F) -> FnJob<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    FnJob {
        name: name.into(),
        run,
    }
}

impl<F> fmt::Debug for FnJob<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        (self.run)(ctx).await
    }
}
