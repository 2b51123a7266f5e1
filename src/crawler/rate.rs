//! Adaptive request pacing
//!
//! The controller waits `max(min delay, last latency) + jitter` before every
//! request, clamped to the configured floor. A listing latency that jumps past
//! `slowdown_factor` times the previous one owes a single extended cooldown,
//! taken at the start of the next wait.

use crate::config::CrawlerConfig;
use crate::state::{CooldownKind, RateState};
use rand::Rng;
use std::time::Duration;

/// Pacing and cooldown controller
///
/// Owns the run's [`RateState`]. Nothing is persisted; a new controller
/// starts from the configured conservative latency.
#[derive(Debug)]
pub struct RateController {
    state: RateState,
    floor: Duration,
    jitter: Duration,
    slowdown_factor: f64,
    timeout_cooldown: Duration,
    connection_cooldown: Duration,
    slowdown_cooldown: Duration,
    last_listing_latency: Option<Duration>,
}

impl RateController {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            state: RateState::new(
                Duration::from_millis(config.min_delay_ms),
                Duration::from_millis(config.initial_latency_ms),
            ),
            floor: Duration::from_millis(config.floor_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            slowdown_factor: config.slowdown_factor,
            timeout_cooldown: Duration::from_millis(config.timeout_cooldown_ms),
            connection_cooldown: Duration::from_millis(config.connection_cooldown_ms),
            slowdown_cooldown: Duration::from_millis(config.slowdown_cooldown_ms),
            last_listing_latency: None,
        }
    }

    pub fn state(&self) -> &RateState {
        &self.state
    }

    /// Computes the next paced delay, jitter included
    pub fn next_delay(&self) -> Duration {
        let base = self.state.base_delay().as_millis() as i64;
        let jitter = self.jitter.as_millis() as i64;
        let offset = if jitter > 0 {
            rand::rng().random_range(-jitter..=jitter)
        } else {
            0
        };

        let delay = Duration::from_millis((base + offset).max(0) as u64);
        delay.max(self.floor)
    }

    /// Sleeps before the next request
    ///
    /// A pending slowdown cooldown is served first, exactly once.
    pub async fn wait_before_request(&mut self) {
        if self.state.pending_cooldown {
            self.state.pending_cooldown = false;
            tracing::warn!(
                "Server slowdown detected; cooling down for {:?}",
                self.slowdown_cooldown
            );
            tokio::time::sleep(self.slowdown_cooldown).await;
        }

        let delay = self.next_delay();
        tracing::trace!("Pacing delay {:?}", delay);
        self.state.waits += 1;
        tokio::time::sleep(delay).await;
    }

    /// Records the latency of any completed round trip
    pub fn record_latency(&mut self, observed: Duration) {
        self.state.last_latency = observed;
    }

    /// Flags a throttling signal if `observed` exceeds `previous` by the slowdown factor
    ///
    /// Returns true if an extended cooldown is now owed.
    pub fn check_for_slowdown(&mut self, observed: Duration, previous: Duration) -> bool {
        if observed > previous.mul_f64(self.slowdown_factor) {
            self.state.consecutive_slowdowns += 1;
            self.state.pending_cooldown = true;
            self.state.cooldowns.record(CooldownKind::Slowdown);
            tracing::info!(
                "Latency jumped from {:?} to {:?} ({} in a row)",
                previous,
                observed,
                self.state.consecutive_slowdowns
            );
            true
        } else {
            self.state.consecutive_slowdowns = 0;
            false
        }
    }

    /// Records a listing latency and compares it with the previous listing fetch
    ///
    /// The first listing of a run is compared with the assumed initial latency.
    pub fn record_listing_latency(&mut self, observed: Duration) -> bool {
        let previous = self.last_listing_latency.unwrap_or(self.state.last_latency);
        self.record_latency(observed);
        self.last_listing_latency = Some(observed);
        self.check_for_slowdown(observed, previous)
    }

    /// Sleeps for the cooldown matching a failure
    ///
    /// A slowdown cooldown taken here also settles any pending one.
    pub async fn cooldown(&mut self, kind: CooldownKind) {
        let duration = match kind {
            CooldownKind::Timeout => self.timeout_cooldown,
            CooldownKind::Connection => self.connection_cooldown,
            CooldownKind::Slowdown => {
                self.state.pending_cooldown = false;
                self.slowdown_cooldown
            }
        };
        self.state.cooldowns.record(kind);
        tracing::info!("{} cooldown for {:?}", kind.as_str(), duration);
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "expected {:?}, waited {:?}",
            expected,
            elapsed
        );
    }

    fn config() -> CrawlerConfig {
        CrawlerConfig {
            min_delay_ms: 1000,
            floor_delay_ms: 500,
            jitter_ms: 0,
            initial_latency_ms: 1000,
            request_timeout_ms: 3050,
            page_cap: 100,
            max_images: 7,
            flush_threshold: 130,
            timeout_cooldown_ms: 4000,
            connection_cooldown_ms: 60000,
            slowdown_factor: 5.0,
            slowdown_cooldown_ms: 30000,
            listing_retries: 2,
        }
    }

    #[test]
    fn test_delay_uses_larger_of_min_and_latency() {
        let mut rate = RateController::new(&config());
        assert_eq!(rate.next_delay(), Duration::from_millis(1000));

        rate.record_latency(Duration::from_millis(2500));
        assert_eq!(rate.next_delay(), Duration::from_millis(2500));

        rate.record_latency(Duration::from_millis(10));
        assert_eq!(rate.next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_in_bounds_and_above_floor() {
        let mut config = config();
        config.min_delay_ms = 600;
        config.initial_latency_ms = 0;
        config.jitter_ms = 400;
        let rate = RateController::new(&config);

        for _ in 0..200 {
            let delay = rate.next_delay();
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_slowdown_threshold() {
        let mut rate = RateController::new(&config());

        assert!(!rate.check_for_slowdown(Duration::from_secs(3), Duration::from_secs(1)));
        assert!(!rate.state().pending_cooldown);

        assert!(rate.check_for_slowdown(Duration::from_secs(6), Duration::from_secs(1)));
        assert!(rate.state().pending_cooldown);
        assert_eq!(rate.state().cooldowns.slowdown, 1);
    }

    #[test]
    fn test_listing_latency_compares_consecutive_listings() {
        let mut rate = RateController::new(&config());

        assert!(!rate.record_listing_latency(Duration::from_millis(900)));
        rate.record_latency(Duration::from_millis(50));
        assert!(rate.record_listing_latency(Duration::from_millis(4600)));
        assert_eq!(rate.state().consecutive_slowdowns, 1);
        assert!(!rate.record_listing_latency(Duration::from_millis(5000)));
        assert_eq!(rate.state().consecutive_slowdowns, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slowdown_inserts_exactly_one_cooldown() {
        let mut rate = RateController::new(&config());
        rate.record_latency(Duration::from_secs(1));
        assert!(rate.check_for_slowdown(Duration::from_secs(6), Duration::from_secs(1)));
        rate.record_latency(Duration::from_secs(1));

        let start = Instant::now();
        rate.wait_before_request().await;
        assert_elapsed(start, Duration::from_secs(31));

        let start = Instant::now();
        rate.wait_before_request().await;
        assert_elapsed(start, Duration::from_secs(1));
        assert_eq!(rate.state().waits, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cooldowns() {
        let mut rate = RateController::new(&config());

        let start = Instant::now();
        rate.cooldown(CooldownKind::Timeout).await;
        assert_elapsed(start, Duration::from_secs(4));

        let start = Instant::now();
        rate.cooldown(CooldownKind::Connection).await;
        assert_elapsed(start, Duration::from_secs(60));

        assert_eq!(rate.state().cooldowns.timeout, 1);
        assert_eq!(rate.state().cooldowns.connection, 1);
    }
}
