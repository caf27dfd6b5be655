//! Per-bucket mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A map of one mutex per bucket id.
///
/// Holding a bucket's lock serializes mutations of that bucket without
/// blocking work on other buckets. The guarded value is `()`, so a poisoned
/// lock carries no broken state and is simply reacquired.
///
/// Entries only live while some caller holds or waits for them, so the map
/// stays as small as the number of buckets being worked on at once.
#[derive(Debug, Default)]
pub struct BucketLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BucketLocks {
    /// Creates an empty lock map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `bucket_id`.
    pub fn with_lock<T>(&self, bucket_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(bucket_id.to_string()).or_default())
        };
        let value = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(bucket_id, lock);
        value
    }

    /// Drops the caller's handle and removes the entry if nobody else has one.
    fn release(&self, bucket_id: &str, lock: Arc<Mutex<()>>) {
        // Handles are only cloned under the map lock, so the count is stable here.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks
            .get(bucket_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(bucket_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
