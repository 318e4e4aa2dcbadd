//! Retry logic with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;

use crate::errors::{ConnectorError, RetryClass};

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor^attempt`, capped at `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        /// Random +/- 50% on every delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            factor: 2.0,
            max: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(attempt as i32);
                let capped = (base.as_secs_f64() * scale).min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(capped);

                if !jitter {
                    return delay;
                }
                let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                let offset = rand::thread_rng().gen_range(0..=jitter_ms * 2);
                let total_ms = delay.as_millis() as i64 + offset as i64 - jitter_ms as i64;
                Duration::from_millis(total_ms.max(0) as u64)
            }
        }
    }
}

/// Attempt budget shared by every outbound provider call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or the
    /// budget is spent. Rate limiting that survives every attempt comes back as
    /// [`ConnectorError::Overloaded`].
    pub async fn run<T, F, Fut>(&self, provider: &str, mut call: F) -> Result<T, ConnectorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ConnectorError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.retry_class() == RetryClass::Never => {
                    debug!("{} failed with non-retryable error: {}", provider, e);
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= attempts {
                        warn!("{} still failing after {} attempts: {}", provider, attempts, e);
                        return Err(e.exhausted());
                    }
                    let delay = self.backoff.delay(attempt - 1);
                    warn!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        provider, attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant() -> RetryPolicy {
        RetryPolicy::fixed(Duration::ZERO, 3)
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(1)); // capped
    }

    #[test]
    fn test_jitter_stays_within_half() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };
        for _ in 0..10 {
            for attempt in 0..5 {
                let expected = (100.0 * 2_f64.powi(attempt as i32)).min(1000.0);
                let delay_ms = backoff.delay(attempt).as_millis() as f64;
                assert!(delay_ms >= expected * 0.49, "attempt={} delay={}", attempt, delay_ms);
                assert!(delay_ms <= expected * 1.51, "attempt={} delay={}", attempt, delay_ms);
            }
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = instant()
            .run("TEST", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ConnectorError::Server {
                        provider: "TEST".to_string(),
                        status: 502,
                    })
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_rate_limit_is_overloaded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = instant()
            .run("TEST", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ConnectorError::RateLimited {
                    provider: "TEST".to_string(),
                })
            })
            .await;
        assert_eq!(
            result,
            Err(ConnectorError::Overloaded {
                provider: "TEST".to_string()
            })
        );
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_malformed_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = instant()
            .run("TEST", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ConnectorError::malformed("TEST", "bad json"))
            })
            .await;
        assert!(matches!(result, Err(ConnectorError::Malformed { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
