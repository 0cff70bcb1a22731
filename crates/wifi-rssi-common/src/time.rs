//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Shared primitives and utilities for the service and client."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic ticks, the simulated equivalent of a jiffies counter.
///
/// Implementations must be lock-free: the deferred update path reads the
/// clock from a context that is not allowed to block.
pub trait Clock: Send + Sync {
    fn ticks(&self) -> u64;
}

/// Tick counter derived from [`Instant`] with a fixed tick length.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    tick: Duration,
}

impl MonotonicClock {
    pub fn new(tick: Duration) -> Self {
        Self {
            origin: Instant::now(),
            tick: tick.max(Duration::from_nanos(1)),
        }
    }
}

impl Clock for MonotonicClock {
    fn ticks(&self) -> u64 {
        let elapsed = self.origin.elapsed().as_nanos();
        let ticks = elapsed / self.tick.as_nanos();
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}

/// Clock advanced explicitly; used by tests and replay tooling.
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            ticks: AtomicU64::new(start),
        }
    }

    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Release);
    }

    pub fn advance(&self, by: u64) -> u64 {
        self.ticks.fetch_add(by, Ordering::AcqRel).wrapping_add(by)
    }
}

impl Clock for ManualClock {
    fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}
