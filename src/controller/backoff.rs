//! # Fast-then-slow Backoff
//!
//! Retry delays for failed reconciles: a short delay for the first few
//! failures of a resource, then a longer fixed delay until it succeeds.
//!
//! ## Usage
//!
//! ```rust
//! use cert_watch::controller::backoff::FastSlowBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = FastSlowBackoff::new(Duration::from_secs(5), Duration::from_secs(30), 2);
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(30));
//! ```

use crate::config::ControllerConfig;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// An entry with no failure for this many slow delays belongs to a resource
/// that was deleted while failing, and is dropped
const STALE_AFTER_SLOW_DELAYS: u32 = 10;

#[derive(Debug, Clone)]
pub struct FastSlowBackoff {
    fast: Duration,
    slow: Duration,
    max_fast_attempts: u32,
    failures: u32,
}

impl FastSlowBackoff {
    #[must_use]
    pub fn new(fast: Duration, slow: Duration, max_fast_attempts: u32) -> Self {
        Self {
            fast,
            slow,
            max_fast_attempts,
            failures: 0,
        }
    }

    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.retry_fast_delay(),
            config.retry_slow_delay(),
            config.retry_max_fast_attempts,
        )
    }

    /// Record a failure and return the delay before the next attempt
    pub fn next_backoff(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        if self.failures <= self.max_fast_attempts {
            self.fast
        } else {
            self.slow
        }
    }

    /// Consecutive failures recorded since the last reset
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

#[derive(Debug)]
struct TrackedBackoff {
    backoff: FastSlowBackoff,
    last_failure: Instant,
}

/// Backoff state per resource, keyed by `kind:namespace/name`
#[derive(Debug)]
pub struct BackoffTracker {
    template: FastSlowBackoff,
    stale_after: Duration,
    states: Mutex<HashMap<String, TrackedBackoff>>,
}

impl BackoffTracker {
    #[must_use]
    pub fn new(template: FastSlowBackoff) -> Self {
        let stale_after = template.slow.saturating_mul(STALE_AFTER_SLOW_DELAYS);
        Self {
            template,
            stale_after,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure of `key`; returns the retry delay and the failure count.
    /// Entries that have not failed recently are pruned on the way.
    pub fn record_failure(&self, key: &str) -> (Duration, u32) {
        match self.states.lock() {
            Ok(mut states) => {
                let now = Instant::now();
                let before = states.len();
                states.retain(|tracked_key, tracked| {
                    tracked_key == key || now.duration_since(tracked.last_failure) < self.stale_after
                });
                if states.len() < before {
                    debug!("pruned {} stale backoff entries", before - states.len());
                }

                let state = states.entry(key.to_string()).or_insert_with(|| TrackedBackoff {
                    backoff: self.template.clone(),
                    last_failure: now,
                });
                state.last_failure = now;
                let delay = state.backoff.next_backoff();
                (delay, state.backoff.failures())
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using slow delay", e);
                (self.template.slow, 0)
            }
        }
    }

    /// Forget the failures of `key` after a successful reconcile
    pub fn reset(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }

    /// Number of resources with recorded failures
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.states.lock().map(|states| states.len()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> FastSlowBackoff {
        FastSlowBackoff::new(Duration::from_secs(5), Duration::from_secs(30), 5)
    }

    #[test]
    fn test_fast_then_slow() {
        let mut backoff = backoff();
        for _ in 0..5 {
            assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
        }
        assert_eq!(backoff.next_backoff(), Duration::from_secs(30));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(30));
        assert_eq!(backoff.failures(), 7);
    }

    #[test]
    fn test_reset_returns_to_fast() {
        let mut backoff = backoff();
        for _ in 0..6 {
            backoff.next_backoff();
        }
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_prunes_resources_that_stopped_failing() {
        let tracker = BackoffTracker::new(backoff());
        tracker.record_failure("CertWatcher:a/deleted");
        tracker.record_failure("CertWatcher:a/flapping");
        assert_eq!(tracker.tracked(), 2);

        tokio::time::advance(Duration::from_secs(200)).await;
        tracker.record_failure("CertWatcher:a/flapping");
        tokio::time::advance(Duration::from_secs(200)).await;
        // "deleted" last failed 400s ago, ten slow delays is 300s
        assert_eq!(tracker.record_failure("CertWatcher:a/other").1, 1);

        assert_eq!(tracker.tracked(), 2);
        assert_eq!(tracker.record_failure("CertWatcher:a/flapping").1, 3);
        assert_eq!(tracker.record_failure("CertWatcher:a/deleted").1, 1);
    }

    #[tokio::test]
    async fn test_tracker_is_per_resource() {
        let tracker = BackoffTracker::new(FastSlowBackoff::new(
            Duration::from_secs(5),
            Duration::from_secs(30),
            1,
        ));
        assert_eq!(tracker.record_failure("CertWatcher:a/w1").0, Duration::from_secs(5));
        assert_eq!(tracker.record_failure("CertWatcher:a/w1").0, Duration::from_secs(30));
        assert_eq!(tracker.record_failure("CertWatcher:a/w2").0, Duration::from_secs(5));

        tracker.reset("CertWatcher:a/w1");
        assert_eq!(tracker.record_failure("CertWatcher:a/w1"), (Duration::from_secs(5), 1));
    }
}
