//! Name-keyed store of schedule entries.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::types::ScheduleEntry;
use crate::{Job, JobStatus};

/// Result of trying to mark an entry as running.
pub(crate) enum Claim {
    /// The entry was idle and is now running; here is its job.
    Claimed(Arc<dyn Job>),
    /// The entry is already running.
    Busy,
    /// No entry has this name.
    Missing,
}

/// All registered jobs, behind a single reader/writer lock.
///
/// The lock is never held across an await point outside this module.
#[derive(Default)]
pub(crate) struct Registry {
    entries: RwLock<HashMap<String, ScheduleEntry>>,
}

impl Registry {
    /// Insert or replace the entry for `job.name()`.
    ///
    /// Returns true if an existing entry was replaced. A replacement inherits
    /// the running flag of the entry it replaces, so a job never overlaps
    /// with itself across re-registration.
    pub async fn insert(
        &self,
        job: Arc<dyn Job>,
        interval: Duration,
        next_run: DateTime<Utc>,
    ) -> bool {
        let name = job.name().to_string();
        let mut entry = ScheduleEntry::new(job, interval, next_run);

        let mut entries = self.entries.write().await;
        let previous = entries.get(&name).map(|e| e.running);
        if let Some(running) = previous {
            entry.running = running;
        }
        entries.insert(name, entry);
        previous.is_some()
    }

    /// Names of all entries that are idle and due at `now`.
    pub async fn due(&self, now: DateTime<Utc>) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.is_due(now))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Whether the named entry is running, or `None` if it does not exist.
    pub async fn is_running(&self, name: &str) -> Option<bool> {
        self.entries.read().await.get(name).map(|e| e.running)
    }

    /// Atomically move an idle entry to running.
    pub async fn claim(&self, name: &str) -> Claim {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(name) else {
            return Claim::Missing;
        };

        if entry.begin() {
            Claim::Claimed(Arc::clone(&entry.job))
        } else {
            Claim::Busy
        }
    }

    /// Record completion of the named entry's execution.
    ///
    /// Returns false if the entry no longer exists.
    pub async fn complete(&self, name: &str, completed_at: DateTime<Utc>) -> bool {
        match self.entries.write().await.get_mut(name) {
            Some(entry) => {
                entry.complete(completed_at);
                true
            }
            None => false,
        }
    }

    /// Undo a claim whose execution never started, leaving bookkeeping untouched.
    pub async fn release(&self, name: &str) {
        if let Some(entry) = self.entries.write().await.get_mut(name) {
            entry.running = false;
        }
    }

    pub async fn get(&self, name: &str) -> Option<JobStatus> {
        self.entries.read().await.get(name).map(ScheduleEntry::status)
    }

    pub async fn snapshot(&self) -> BTreeMap<String, JobStatus> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(name, e)| (name.clone(), e.status()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
