//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Runtime helpers supporting the service."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

/// Simple async rate limiter that ensures deterministic loop intervals.
#[derive(Debug)]
pub struct RateLimiter {
    interval: tokio::time::Interval,
}

impl RateLimiter {
    /// First tick completes at `start`, then every `period`.
    pub fn starting_at(start: Instant, period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_are_spaced_by_period() {
        let start = Instant::now() + Duration::from_millis(50);
        let mut limiter = RateLimiter::starting_at(start, Duration::from_millis(100));
        let first = limiter.tick().await;
        let second = limiter.tick().await;
        assert_eq!(first, start);
        assert_eq!(second - first, Duration::from_millis(100));
        assert_eq!(limiter.period(), Duration::from_millis(100));
    }
}
