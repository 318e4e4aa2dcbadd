//! Fixed-interval throttle for low-rate-limit providers.
//!
//! Unlike a token bucket there is no burst: consecutive calls through the
//! same throttle are spaced at least `min_interval` apart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    /// A throttle that never waits.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Waits until `min_interval` has passed since the previous call, then
    /// claims the slot.
    ///
    /// The lock is held across the sleep so concurrent syncs queue up instead
    /// of all waking at once.
    pub async fn wait(&self, provider: &str) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                debug!("Throttling {} for {:?}", provider, ready_at - now);
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// One [`Throttle`] per provider id, shared by every connector built from the
/// same factory so concurrent syncs respect a single spacing.
#[derive(Debug, Clone, Default)]
pub struct ThrottleRegistry {
    throttles: Arc<HashMap<String, Throttle>>,
}

impl ThrottleRegistry {
    pub fn new(spacing: &HashMap<String, Duration>) -> Self {
        let throttles = spacing
            .iter()
            .map(|(provider, interval)| (provider.clone(), Throttle::new(*interval)))
            .collect();
        Self {
            throttles: Arc::new(throttles),
        }
    }

    /// The provider's throttle; providers without a configured spacing get a
    /// disabled one.
    pub fn get(&self, provider: &str) -> Throttle {
        self.throttles
            .get(provider)
            .cloned()
            .unwrap_or_else(Throttle::disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_spaces_consecutive_calls() {
        let throttle = Throttle::new(Duration::from_millis(250));
        let start = Instant::now();

        throttle.wait("TEST").await;
        throttle.wait("TEST").await;
        throttle.wait("TEST").await;

        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_shares_one_throttle_per_provider() {
        let spacing = HashMap::from([("ESPLORA".to_string(), Duration::from_secs(1))]);
        let registry = ThrottleRegistry::new(&spacing);
        let start = Instant::now();

        registry.get("ESPLORA").wait("ESPLORA").await;
        registry.get("ESPLORA").wait("ESPLORA").await;
        assert!(start.elapsed() >= Duration::from_secs(1));

        let before = Instant::now();
        registry.get("OTHER").wait("OTHER").await;
        registry.get("OTHER").wait("OTHER").await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_disabled_never_waits() {
        let throttle = Throttle::disabled();
        let start = Instant::now();
        for _ in 0..5 {
            throttle.wait("TEST").await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
