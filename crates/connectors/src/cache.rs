//! Single-value cache with an explicit expiry.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// Holds one value (e.g. a provider's asset table) until `ttl` elapses.
pub struct ExpiringCache<T> {
    ttl: Duration,
    entry: Mutex<Option<Entry<T>>>,
}

impl<T: Clone> ExpiringCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    // A poisoned lock only means a stale or missing value; recover it.
    fn lock(&self) -> MutexGuard<'_, Option<Entry<T>>> {
        self.entry.lock().unwrap_or_else(|poisoned| {
            warn!("Expiring cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// The cached value, if present and not expired.
    pub fn get(&self) -> Option<T> {
        let guard = self.lock();
        guard
            .as_ref()
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    pub fn set(&self, value: T) {
        *self.lock() = Some(Entry {
            value,
            expires_at: Instant::now() + self.ttl,
        });
    }

    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    /// Returns the cached value or loads, stores and returns a fresh one.
    ///
    /// The lock is not held while `load` runs; two concurrent misses may both
    /// load, and the later one wins.
    pub async fn get_or_refresh<F, Fut, E>(&self, load: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        debug!("Expiring cache miss, refreshing");
        let value = load().await?;
        self.set(value.clone());
        Ok(value)
    }
}
