//! Cancellable child processes.

use std::process::ExitStatus;

use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

/// How a supervised child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// The process exited on its own with a zero status.
    Success,
    /// The process exited on its own with a failure.
    ///
    /// The code is `None` when the process was terminated by a signal we did
    /// not send, or when waiting on it failed.
    Failed(Option<i32>),
    /// The process was killed through its kill token.
    Killed,
}

impl ChildExit {
    fn from_status(status: std::io::Result<ExitStatus>) -> Self {
        match status {
            Ok(status) if status.success() => Self::Success,
            Ok(status) => Self::Failed(status.code()),
            Err(e) => {
                error!("Error waiting for process: {}", e);
                Self::Failed(None)
            }
        }
    }

    /// Whether the process ended with a zero status on its own.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Whether the process was killed by its supervisor.
    pub fn is_killed(&self) -> bool {
        matches!(self, Self::Killed)
    }
}

/// A child process watched by a background waiter task.
///
/// The waiter races the process exit against the kill token. Whichever comes
/// first decides the recorded [`ChildExit`]; once the process has been reaped,
/// cancelling the token has no effect on it.
#[derive(Debug, Clone)]
pub struct SupervisedChild {
    pid: Option<u32>,
    kill: CancellationToken,
    exit: watch::Receiver<Option<ChildExit>>,
}

/// Hand a spawned child over to a waiter task spawned on `tracker`.
///
/// Cancelling `kill` (or any parent of it) kills the process. Pass a child
/// token of an operation's context to tie the process lifetime to it. The
/// waiter stays counted by `tracker` until the process has been reaped.
pub fn supervise(
    mut child: Child,
    kill: CancellationToken,
    tracker: &TaskTracker,
) -> SupervisedChild {
    let pid = child.id();
    let (tx, rx) = watch::channel(None);
    let token = kill.clone();

    tracker.spawn(async move {
        let exit = tokio::select! {
            biased;
            status = child.wait() => ChildExit::from_status(status),
            _ = token.cancelled() => {
                debug!(?pid, "Kill requested, killing process");
                // The process may have exited between the two branches; a
                // failed kill on a reaped child is expected and harmless.
                let _ = child.kill().await;
                ChildExit::Killed
            }
        };
        let _ = tx.send(Some(exit));
    });

    SupervisedChild {
        pid,
        kill,
        exit: rx,
    }
}

impl SupervisedChild {
    /// OS process id, if the process was still running when supervised.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Request the process to be killed.
    ///
    /// Idempotent and safe to call after the process has exited.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// The recorded exit, if the process has already ended.
    pub fn try_exit(&self) -> Option<ChildExit> {
        *self.exit.borrow()
    }

    /// Wait for the process to end.
    ///
    /// Can be awaited from several places; every caller observes the same exit.
    pub async fn wait(&self) -> ChildExit {
        let mut rx = self.exit.clone();
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(exit) => *exit,
            // The waiter task went away without reporting (runtime shutdown).
            Err(_) => None,
        };
        exit.unwrap_or(ChildExit::Failed(None))
    }
}
