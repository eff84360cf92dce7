//! Periodic background sweeps for the in-memory stores.
//!
//! Each store implements [`Sweep`] and gets exactly one long-lived task from
//! [`spawn_sweeper`]. The task ticks on a fixed interval until its
//! [`SweeperHandle`] is stopped, which lets shutdown and tests join it
//! instead of leaking it.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A store that can drop stale entries in one pass.
pub trait Sweep: Send + Sync + 'static {
    /// Short name used in log events.
    fn name(&self) -> &'static str;

    /// Remove stale entries and return how many were removed.
    fn sweep(&self) -> usize;
}

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    name: &'static str,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task to stop and wait for it to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(name: "sweeper.join_failed", sweeper = self.name, error = %e, "Sweeper task did not exit cleanly");
        }
    }
}

/// Run `target.sweep()` every `every`, starting one interval from now.
///
/// An interval too large to schedule leaves the sweeper idle until it is
/// shut down. Must be called from within a Tokio runtime.
pub fn spawn_sweeper<S: Sweep>(target: S, every: Duration) -> SweeperHandle {
    let name = target.name();
    let token = CancellationToken::new();
    let stop = token.clone();

    let task = tokio::spawn(async move {
        let Some(first) = tokio::time::Instant::now().checked_add(every) else {
            warn!(name: "sweeper.disabled", sweeper = name, interval_secs = every.as_secs(), "Sweep interval out of range");
            stop.cancelled().await;
            return;
        };
        let mut ticker = interval_at(first, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(name: "sweeper.started", sweeper = name, interval_secs = every.as_secs(), "Sweeper started");

        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = target.sweep();
                    debug!(name: "sweeper.pass", sweeper = name, removed, "Sweep pass finished");
                }
            }
        }

        info!(name: "sweeper.stopped", sweeper = name, "Sweeper stopped");
    });

    SweeperHandle { name, token, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Counting(Arc<AtomicUsize>);

    impl Sweep for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn sweep(&self) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_ticks_on_interval() {
        let target = Counting::default();
        let passes = Arc::clone(&target.0);
        let handle = spawn_sweeper(target, Duration::from_secs(300));

        // No pass at start-up.
        tokio::task::yield_now().await;
        assert_eq!(passes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(passes.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(passes.load(Ordering::SeqCst), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_further_passes() {
        let target = Counting::default();
        let passes = Arc::clone(&target.0);
        let handle = spawn_sweeper(target, Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(11)).await;
        handle.shutdown().await;
        let after_stop = passes.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(passes.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_interval_does_not_panic() {
        let target = Counting::default();
        let passes = Arc::clone(&target.0);
        let handle = spawn_sweeper(target, Duration::from_secs(u64::MAX));

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(passes.load(Ordering::SeqCst), 0);

        // Still joinable, and the task did not die from a panic.
        assert!(!handle.task.is_finished());
        handle.shutdown().await;
    }
}
