//! Global admission gate for job executions.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Bounds how many executions may run at once across the whole scheduler.
///
/// Admission never waits: [`Governor::try_acquire`] either hands out a
/// [`Permit`] or reports that the budget is exhausted.
#[derive(Debug, Clone)]
pub struct Governor {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A slot in the governor's budget, released on drop.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

impl Governor {
    /// Create a governor admitting at most `capacity` concurrent executions.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take a slot if one is free.
    pub fn try_acquire(&self) -> Option<Permit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(Permit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => None,
            // The semaphore is never closed.
            Err(TryAcquireError::Closed) => None,
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_capacity() {
        let governor = Governor::new(2);

        let a = governor.try_acquire();
        let b = governor.try_acquire();
        let c = governor.try_acquire();

        assert!(a.is_some());
        assert!(b.is_some());
        assert!(c.is_none());
        assert_eq!(governor.in_use(), 2);
        assert_eq!(governor.available(), 0);
    }

    #[test]
    fn test_drop_releases_slot() {
        let governor = Governor::new(1);

        let permit = governor.try_acquire();
        assert!(governor.try_acquire().is_none());

        drop(permit);
        assert_eq!(governor.available(), 1);
        assert!(governor.try_acquire().is_some());
    }

    #[test]
    fn test_clones_share_budget() {
        let governor = Governor::new(1);
        let other = governor.clone();

        let _held = governor.try_acquire();
        assert!(other.try_acquire().is_none());
        assert_eq!(other.capacity(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_never_exceeds_capacity() {
        let governor = Governor::new(3);
        let mut handles = Vec::new();

        for _ in 0..32 {
            let governor = governor.clone();
            handles.push(tokio::spawn(async move {
                let permit = governor.try_acquire();
                let held = governor.in_use();
                tokio::task::yield_now().await;
                drop(permit);
                held
            }));
        }

        for handle in handles {
            let held = handle.await.unwrap();
            assert!(held <= 3);
        }
        assert_eq!(governor.available(), 3);
    }
}
