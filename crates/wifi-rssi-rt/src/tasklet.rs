//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Runtime helpers supporting the service."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
//! Tasklets: deferred work that runs outside the context that requested it.
//!
//! A tasklet wraps one [`DeferredWork`] item and a dedicated runner task.
//! Scheduling only raises a pending flag, so it is safe from any context.
//! The runner executes the work at most once per pending flag and never
//! concurrently with itself. [`Tasklet::kill`] clears the flag, stops the
//! runner and waits for an in-flight run to return; once it resolves the work
//! can no longer execute.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::scheduling::RateLimiter;

/// Work executed in deferred context.
///
/// `run` is synchronous so it cannot await. Implementations must also avoid
/// blocking calls and any lock that a blocking path may hold.
pub trait DeferredWork: Send + Sync + 'static {
    fn run(&self);

    fn name(&self) -> &'static str;
}

/// When the runner raises the pending flag on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskletSchedule {
    /// Only explicit [`Tasklet::schedule`] calls trigger runs.
    #[default]
    Manual,
    /// Trigger once after `delay`.
    OneShot { delay: Duration },
    /// Trigger after `delay`, then every `period`.
    Periodic { delay: Duration, period: Duration },
}

/// Counters describing a tasklet's history.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskletStats {
    /// Completed executions of the work.
    pub runs: u64,
    /// Schedule requests folded into an already pending run.
    pub coalesced: u64,
    /// Whether a run is currently pending.
    pub pending: bool,
}

#[derive(Default)]
struct Shared {
    pending: AtomicBool,
    killed: AtomicBool,
    wake: Notify,
    runs: AtomicU64,
    coalesced: AtomicU64,
}

impl Shared {
    fn schedule(&self) -> bool {
        if self.killed.load(Ordering::Acquire) {
            return false;
        }
        if self.pending.swap(true, Ordering::AcqRel) {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.wake.notify_one();
        true
    }

    fn stats(&self) -> TaskletStats {
        TaskletStats {
            runs: self.runs.load(Ordering::Acquire),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Acquire),
        }
    }
}

/// Cloneable trigger for a tasklet, for code that must not own it.
#[derive(Clone)]
pub struct TaskletHandle {
    name: &'static str,
    shared: Arc<Shared>,
}

impl TaskletHandle {
    /// Mark the tasklet pending. Returns `false` when it already was, or
    /// when the tasklet has been killed.
    pub fn schedule(&self) -> bool {
        let scheduled = self.shared.schedule();
        trace!(tasklet = self.name, scheduled, "tasklet schedule requested");
        scheduled
    }

    pub fn stats(&self) -> TaskletStats {
        self.shared.stats()
    }
}

/// Owner of a running tasklet.
pub struct Tasklet {
    name: &'static str,
    shared: Arc<Shared>,
    runner: Option<JoinHandle<()>>,
}

impl Tasklet {
    /// Start the runner for `work`. Must be called inside a Tokio runtime.
    pub fn spawn<W: DeferredWork>(work: Arc<W>, schedule: TaskletSchedule) -> Self {
        let name = work.name();
        let shared = Arc::new(Shared::default());
        let runner = tokio::spawn(run_tasklet(work, shared.clone(), schedule));
        debug!(tasklet = name, ?schedule, "tasklet initialised");
        Self {
            name,
            shared,
            runner: Some(runner),
        }
    }

    /// Mark the tasklet pending; see [`TaskletHandle::schedule`].
    pub fn schedule(&self) -> bool {
        self.handle().schedule()
    }

    pub fn handle(&self) -> TaskletHandle {
        TaskletHandle {
            name: self.name,
            shared: self.shared.clone(),
        }
    }

    pub fn stats(&self) -> TaskletStats {
        self.shared.stats()
    }

    /// Cancel any pending run and wait for an in-flight run to finish.
    pub async fn kill(mut self) -> TaskletStats {
        self.shared.killed.store(true, Ordering::Release);
        self.shared.pending.store(false, Ordering::Release);
        self.shared.wake.notify_one();
        if let Some(runner) = self.runner.take() {
            if let Err(err) = runner.await {
                warn!(tasklet = self.name, error = %err, "tasklet runner join failure");
            }
        }
        let stats = self.shared.stats();
        debug!(tasklet = self.name, runs = stats.runs, "tasklet killed");
        stats
    }
}

impl Drop for Tasklet {
    fn drop(&mut self) {
        // Dropped without kill(): stop future runs, cannot wait for a current one.
        if let Some(runner) = self.runner.take() {
            self.shared.killed.store(true, Ordering::Release);
            self.shared.wake.notify_one();
            runner.abort();
        }
    }
}

enum Trigger {
    Idle,
    Once(Instant),
    Every(RateLimiter),
}

impl Trigger {
    fn new(schedule: TaskletSchedule) -> Self {
        let now = Instant::now();
        match schedule {
            TaskletSchedule::Manual => Trigger::Idle,
            TaskletSchedule::OneShot { delay } => Trigger::Once(now + delay),
            TaskletSchedule::Periodic { delay, period } => Trigger::Every(
                RateLimiter::starting_at(now + delay, period.max(Duration::from_millis(1))),
            ),
        }
    }

    async fn fire(&mut self) {
        match self {
            Trigger::Idle => std::future::pending::<()>().await,
            Trigger::Once(at) => tokio::time::sleep_until(*at).await,
            Trigger::Every(limiter) => {
                limiter.tick().await;
            }
        }
    }
}

async fn run_tasklet<W: DeferredWork>(work: Arc<W>, shared: Arc<Shared>, schedule: TaskletSchedule) {
    let mut trigger = Trigger::new(schedule);
    loop {
        tokio::select! {
            biased;
            _ = shared.wake.notified() => {}
            _ = trigger.fire() => {
                if matches!(trigger, Trigger::Once(_)) {
                    trigger = Trigger::Idle;
                }
                shared.schedule();
            }
        }

        if shared.killed.load(Ordering::Acquire) {
            break;
        }
        if shared.pending.swap(false, Ordering::AcqRel) {
            work.run();
            shared.runs.fetch_add(1, Ordering::AcqRel);
        }
    }
    trace!(tasklet = work.name(), "tasklet runner exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    impl DeferredWork for Counter {
        fn run(&self) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counter"
        }
    }

    impl Counter {
        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_runs_exactly_once() {
        let work = Arc::new(Counter::default());
        let tasklet = Tasklet::spawn(
            work.clone(),
            TaskletSchedule::OneShot {
                delay: Duration::from_millis(10),
            },
        );
        settle().await;
        assert_eq!(work.hits(), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        settle().await;
        assert_eq!(work.hits(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(work.hits(), 1);
        assert_eq!(tasklet.kill().await.runs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_schedule_rearms() {
        let work = Arc::new(Counter::default());
        let tasklet = Tasklet::spawn(
            work.clone(),
            TaskletSchedule::Periodic {
                delay: Duration::ZERO,
                period: Duration::from_millis(100),
            },
        );
        tokio::time::sleep(Duration::from_millis(350)).await;
        settle().await;
        let stats = tasklet.kill().await;
        assert_eq!(work.hits(), 4);
        assert_eq!(stats.runs, 4);
    }

    #[tokio::test]
    async fn manual_schedule_runs_once_per_pending_flag() {
        let work = Arc::new(Counter::default());
        let tasklet = Tasklet::spawn(work.clone(), TaskletSchedule::Manual);
        assert!(tasklet.schedule());
        settle().await;
        assert_eq!(work.hits(), 1);
        assert!(tasklet.handle().schedule());
        settle().await;
        assert_eq!(work.hits(), 2);
        tasklet.kill().await;
    }

    #[tokio::test]
    async fn kill_cancels_pending_run() {
        let work = Arc::new(Counter::default());
        let tasklet = Tasklet::spawn(
            work.clone(),
            TaskletSchedule::OneShot {
                delay: Duration::from_secs(3600),
            },
        );
        let handle = tasklet.handle();
        let stats = tasklet.kill().await;
        assert_eq!(stats.runs, 0);
        assert!(!stats.pending);
        assert!(!handle.schedule(), "killed tasklet refuses new work");
        settle().await;
        assert_eq!(work.hits(), 0);
    }

    #[tokio::test]
    async fn pending_schedules_coalesce() {
        let work = Arc::new(Counter::default());
        let tasklet = Tasklet::spawn(work.clone(), TaskletSchedule::Manual);
        let handle = tasklet.handle();
        // current-thread runtime: the runner cannot run between these calls
        assert!(handle.schedule());
        assert!(!handle.schedule());
        assert!(!handle.schedule());
        settle().await;
        assert_eq!(work.hits(), 1);
        assert_eq!(tasklet.kill().await.coalesced, 2);
    }
}
