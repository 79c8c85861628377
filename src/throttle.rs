//! Advisory per-domain request spacing.
//!
//! The throttler keeps, for every domain it has seen, the time of the last
//! (or next reserved) request and how many requests went out. Callers `await`
//! [`DomainThrottler::wait`] before each request; concurrent callers for the
//! same domain are spaced against each other because the slot is reserved
//! under the lock before anyone sleeps.

use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ThrottleConfig;

#[derive(Debug, Clone, Copy)]
struct ThrottleState {
    last_fetch: Instant,
    request_count: u32,
}

#[derive(Debug)]
pub struct DomainThrottler {
    config: ThrottleConfig,
    domains: Mutex<HashMap<String, ThrottleState>>,
}

impl Default for DomainThrottler {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl DomainThrottler {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Suspend until it is polite to send the next request to `domain`.
    ///
    /// The first request to a domain never waits.
    pub async fn wait(&self, domain: &str) {
        let pause = self.reserve(domain, Instant::now());
        if !pause.is_zero() {
            debug!(domain, pause_ms = pause.as_millis() as u64, "throttling");
            tokio::time::sleep(pause).await;
        }
    }

    /// Number of throttled requests recorded for `domain` (the first sighting is not counted).
    pub fn request_count(&self, domain: &str) -> Option<u32> {
        self.lock().get(domain).map(|s| s.request_count)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ThrottleState>> {
        self.domains.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self, domain: &str, now: Instant) -> Duration {
        let mut domains = self.lock();
        let Some(state) = domains.get_mut(domain) else {
            domains.insert(
                domain.to_string(),
                ThrottleState {
                    last_fetch: now,
                    request_count: 0,
                },
            );
            return Duration::ZERO;
        };

        let delay = self.pick_delay(state.request_count);
        let target = (state.last_fetch + delay).max(now);
        state.last_fetch = target;
        state.request_count = state.request_count.saturating_add(1);
        target - now
    }

    fn pick_delay(&self, request_count: u32) -> Duration {
        let (mut lo, mut hi) = (self.config.min_interval, self.config.max_interval);
        if hi < lo {
            std::mem::swap(&mut lo, &mut hi);
        }
        if request_count > self.config.hot_domain_threshold {
            lo = lo.saturating_mul(2);
            hi = hi.saturating_mul(2);
        }
        if lo == hi {
            return lo;
        }
        let secs = rand::thread_rng().gen_range(lo.as_secs_f64()..=hi.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(interval_ms: u64, threshold: u32) -> ThrottleConfig {
        ThrottleConfig {
            min_interval: Duration::from_millis(interval_ms),
            max_interval: Duration::from_millis(interval_ms),
            hot_domain_threshold: threshold,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_request_to_domain_does_not_wait() {
        let throttler = DomainThrottler::new(fixed(500, 3));
        let start = Instant::now();
        throttler.wait("example.com").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(throttler.request_count("example.com"), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_waits_at_least_min_interval() {
        let throttler = DomainThrottler::default();
        throttler.wait("example.com").await;
        let after_first = Instant::now();
        throttler.wait("example.com").await;
        assert!(after_first.elapsed() >= ThrottleConfig::default().min_interval);
        assert!(
            after_first.elapsed() < ThrottleConfig::default().max_interval + Duration::from_millis(50)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_time_is_credited() {
        let throttler = DomainThrottler::new(fixed(300, 3));
        throttler.wait("example.com").await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        let before = Instant::now();
        throttler.wait("example.com").await;
        let waited = before.elapsed();
        assert!(waited >= Duration::from_millis(100) && waited < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn domains_are_independent() {
        let throttler = DomainThrottler::new(fixed(400, 3));
        throttler.wait("a.example").await;
        let start = Instant::now();
        throttler.wait("b.example").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn hot_domain_doubles_the_window() {
        let throttler = DomainThrottler::new(fixed(100, 1));
        throttler.wait("example.com").await; // first sighting
        throttler.wait("example.com").await; // count 0 -> 1
        throttler.wait("example.com").await; // count 1 -> 2
        let start = Instant::now();
        throttler.wait("example.com").await; // count 2 > 1: doubled
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(200) && waited < Duration::from_millis(250));
        assert_eq!(throttler.request_count("example.com"), Some(3));
    }

    #[test]
    fn concurrent_reservations_are_spaced() {
        let throttler = DomainThrottler::new(fixed(100, 10));
        let now = Instant::now();
        assert_eq!(throttler.reserve("example.com", now), Duration::ZERO);
        assert_eq!(throttler.reserve("example.com", now), Duration::from_millis(100));
        assert_eq!(throttler.reserve("example.com", now), Duration::from_millis(200));
    }
}
