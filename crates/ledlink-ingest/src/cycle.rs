//! Fetch cycle phases and the periodic timer shared by both schedulers.

use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Phase of a fetch cycle. Phases run strictly in order within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Idle,
    Fetching,
    Normalizing,
    Persisting,
    Publishing,
}

/// Phase of the most recently advanced cycle of one scheduler.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    domain: &'static str,
    phase: Arc<Mutex<CyclePhase>>,
}

impl PhaseTracker {
    pub fn new(domain: &'static str) -> Self {
        Self {
            domain,
            phase: Arc::new(Mutex::new(CyclePhase::Idle)),
        }
    }

    pub fn current(&self) -> CyclePhase {
        *self.phase.lock()
    }

    /// Enter `Fetching`. The returned guard resets the phase to `Idle` when
    /// dropped, whether the cycle succeeded or bailed out with `?`.
    pub fn begin(&self) -> PhaseGuard {
        let guard = PhaseGuard {
            tracker: self.clone(),
        };
        guard.advance(CyclePhase::Fetching);
        guard
    }
}

/// Returns the tracker to `Idle` on drop.
pub struct PhaseGuard {
    tracker: PhaseTracker,
}

impl PhaseGuard {
    pub fn advance(&self, phase: CyclePhase) {
        debug!(domain = self.tracker.domain, ?phase, "Cycle phase");
        *self.tracker.phase.lock() = phase;
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        *self.tracker.phase.lock() = CyclePhase::Idle;
    }
}

/// Run `cycle` every `period` until `shutdown` is cancelled.
///
/// The first tick fires immediately. Each tick spawns the cycle as its own
/// task on `tracker`, so a slow or failing cycle never delays the timer and
/// in-flight cycles can be awaited on shutdown. Cycles are not cancelled
/// mid-way.
pub fn spawn_periodic<F, Fut>(
    domain: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    mut cycle: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cycles = tracker.clone();
    tracker.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(domain, period_secs = period.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!(domain, "Scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    cycles.spawn(cycle());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_guard_resets_to_idle() {
        let tracker = PhaseTracker::new("weather");
        {
            let guard = tracker.begin();
            assert_eq!(tracker.current(), CyclePhase::Fetching);
            guard.advance(CyclePhase::Persisting);
            assert_eq!(tracker.current(), CyclePhase::Persisting);
        }
        assert_eq!(tracker.current(), CyclePhase::Idle);
    }

    #[test]
    fn test_guard_resets_on_early_return() {
        fn failing_cycle(tracker: &PhaseTracker) -> Result<(), &'static str> {
            let guard = tracker.begin();
            guard.advance(CyclePhase::Normalizing);
            Err("schema")
        }

        let tracker = PhaseTracker::new("exchange");
        assert!(failing_cycle(&tracker).is_err());
        assert_eq!(tracker.current(), CyclePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_periodic_ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        let counter = count.clone();
        spawn_periodic(
            "test",
            Duration::from_secs(60),
            shutdown.clone(),
            tracker.clone(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        // First tick is immediate, then one per period.
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        shutdown.cancel();
        tracker.close();
        tracker.wait().await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
