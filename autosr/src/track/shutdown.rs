//! Background work accounting and graceful shutdown.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Default time in-flight work gets to finish after shutdown is requested.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Result of [`Shutdown::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every tracked task finished inside the grace period.
    Drained,
    /// Some tasks were still running when the grace period ran out.
    TimedOut,
}

/// Root cancellation context plus a count of every task spawned under it.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root context. Cancelled when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn `task` and count it until it completes.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Tracker for helper tasks that should also hold up [`Shutdown::drain`],
    /// such as child process waiters.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Number of tracked tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel the root context and wait up to `grace` for tracked work.
    pub async fn drain(&self, grace: Duration) -> DrainOutcome {
        info!(in_flight = self.tracker.len(), ?grace, "Shutting down");
        self.token.cancel();
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("All background work finished");
                DrainOutcome::Drained
            }
            Err(_) => {
                warn!(
                    in_flight = self.tracker.len(),
                    "Shutdown grace period elapsed with work still running"
                );
                DrainOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_waits_for_cooperative_tasks() {
        let shutdown = Shutdown::new();
        let token = shutdown.token();
        shutdown.spawn(async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        assert_eq!(shutdown.in_flight(), 1);

        let outcome = shutdown.drain(Duration::from_secs(2)).await;
        assert_eq!(outcome, DrainOutcome::Drained);
        assert_eq!(shutdown.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drain_times_out_on_stuck_tasks() {
        let shutdown = Shutdown::new();
        shutdown.spawn(tokio::time::sleep(Duration::from_secs(30)));

        let started = tokio::time::Instant::now();
        let outcome = shutdown.drain(Duration::from_millis(50)).await;
        assert_eq!(outcome, DrainOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_drain_with_nothing_running() {
        let shutdown = Shutdown::new();
        assert_eq!(
            shutdown.drain(Duration::from_millis(10)).await,
            DrainOutcome::Drained
        );
        assert!(shutdown.is_shutting_down());
    }
}
