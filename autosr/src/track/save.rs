//! Recording one target: admission, monitoring, recovery and teardown.
//!
//! A save moves through `Admitted → Running → {Recovering → Running}*` and
//! ends `Finished` or `Canceled`. The save task stays admitted for the whole
//! attempt, recoveries included, and is released before the target's
//! `end_save` hook runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use super::recovery::{Recovery, RecoveryFailed};
use super::shutdown::Shutdown;
use super::target::SaveStatus;
use super::task::{SaveTask, SaveTaskTable};
use super::tracked::Tracked;
use crate::downloader::{ChildExit, DownloadProcess, Downloader};
use crate::{Error, Result};

/// What stopped a cancelled save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The process-wide context was cancelled.
    Shutdown,
    /// The target's own cancellation token fired.
    Target,
}

/// How a save ended.
#[derive(Debug)]
pub enum SaveOutcome {
    /// The stream ended, or it could not be recovered.
    Finished { error: Option<Error> },
    Canceled(CancelReason),
}

impl SaveOutcome {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    pub fn status(&self) -> SaveStatus {
        match self {
            Self::Finished { .. } => SaveStatus::Finished,
            Self::Canceled(_) => SaveStatus::Canceled,
        }
    }
}

/// A save running in the background.
#[derive(Debug)]
pub struct SaveHandle {
    task: SaveTask,
    join: JoinHandle<SaveOutcome>,
}

impl SaveHandle {
    pub fn task(&self) -> &SaveTask {
        &self.task
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the save to end.
    pub async fn outcome(self) -> SaveOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => SaveOutcome::Finished {
                error: Some(Error::Other(format!("save monitor failed: {e}"))),
            },
        }
    }
}

/// Result of asking for a save.
#[derive(Debug)]
pub enum SaveStart {
    Started(SaveHandle),
    /// A save for the same target is already in flight; nothing was done.
    AlreadySaving,
    /// The attempt was cancelled before the downloader was spawned.
    Canceled,
}

impl SaveStart {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    pub fn into_handle(self) -> Option<SaveHandle> {
        match self {
            Self::Started(handle) => Some(handle),
            Self::AlreadySaving | Self::Canceled => None,
        }
    }
}

/// Starts saves and owns the table of in-flight ones.
#[derive(Debug)]
pub struct Saver {
    tasks: Arc<SaveTaskTable>,
    downloader: Downloader,
    recovery: Recovery,
    shutdown: Shutdown,
}

impl Saver {
    pub fn new(downloader: Downloader, recovery: Recovery, shutdown: Shutdown) -> Self {
        Self {
            tasks: Arc::new(SaveTaskTable::new()),
            downloader,
            recovery,
            shutdown,
        }
    }

    pub fn tasks(&self) -> &SaveTaskTable {
        &self.tasks
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    /// Whether a save for `link` is in flight.
    pub fn is_saving(&self, link: &str) -> bool {
        self.tasks.is_saving(link)
    }

    /// Start recording `url` for `tracked` under a fresh cancellation token.
    ///
    /// The downloader is spawned before this returns; a spawn failure releases
    /// the task and is returned here. Everything after that happens on a
    /// monitor task.
    pub async fn start(
        &self,
        ctx: &CancellationToken,
        tracked: &Arc<Tracked>,
        url: &str,
    ) -> Result<SaveStart> {
        self.admit(ctx, tracked, url, None).await
    }

    /// Like [`Saver::start`], for an attempt whose token was issued earlier by
    /// [`Tracked::renew_cancel`].
    ///
    /// A token cancelled in the meantime drops the attempt without spawning.
    pub async fn start_attempt(
        &self,
        ctx: &CancellationToken,
        tracked: &Arc<Tracked>,
        url: &str,
        cancel: CancellationToken,
    ) -> Result<SaveStart> {
        self.admit(ctx, tracked, url, Some(cancel)).await
    }

    async fn admit(
        &self,
        ctx: &CancellationToken,
        tracked: &Arc<Tracked>,
        url: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<SaveStart> {
        if tracked.link().is_empty() {
            return Err(Error::MissingLink);
        }
        if url.is_empty() {
            return Err(Error::MissingStreamUrl);
        }

        let task = SaveTask::new(tracked.name(), tracked.link());
        if !self.tasks.try_admit(&task) {
            info!(name = %task.name, link = %task.link, "Already saving");
            return Ok(SaveStart::AlreadySaving);
        }

        let previous = tracked.status();
        tracked.set_status(SaveStatus::Admitted);
        let cancel = cancel.unwrap_or_else(|| tracked.renew_cancel());
        if cancel.is_cancelled() {
            info!(name = %task.name, "Attempt cancelled before recording");
            tracked.set_status(previous);
            self.tasks.release(&task);
            return Ok(SaveStart::Canceled);
        }

        let spawned = self
            .downloader
            .start(ctx, url, tracked.name(), self.shutdown.tracker())
            .await;
        let process = match spawned {
            Ok(process) => process,
            Err(e) => {
                error!(name = %task.name, error = %e, "Failed to start downloader");
                tracked.set_status(previous);
                self.tasks.release(&task);
                return Err(e);
            }
        };

        tracked.target().begin_save();
        tracked.set_status(SaveStatus::Running);

        let monitor = Monitor {
            tasks: Arc::clone(&self.tasks),
            downloader: self.downloader.clone(),
            recovery: self.recovery,
            tracked: Arc::clone(tracked),
            task: task.clone(),
            ctx: ctx.clone(),
            cancel,
            waiters: self.shutdown.tracker().clone(),
        };
        let join = self.shutdown.spawn(monitor.run(process));

        Ok(SaveStart::Started(SaveHandle { task, join }))
    }
}

enum Event {
    Shutdown,
    Canceled,
    Exited(ChildExit),
}

/// Watches one save from the first spawn to a terminal state.
struct Monitor {
    tasks: Arc<SaveTaskTable>,
    downloader: Downloader,
    recovery: Recovery,
    tracked: Arc<Tracked>,
    task: SaveTask,
    ctx: CancellationToken,
    cancel: CancellationToken,
    waiters: TaskTracker,
}

impl Monitor {
    async fn run(self, mut process: DownloadProcess) -> SaveOutcome {
        loop {
            let event = tokio::select! {
                _ = self.ctx.cancelled() => Event::Shutdown,
                _ = self.cancel.cancelled() => Event::Canceled,
                exit = process.wait() => Event::Exited(exit),
            };

            let exit = match event {
                Event::Shutdown => return self.stop(&process, CancelReason::Shutdown).await,
                Event::Canceled => return self.stop(&process, CancelReason::Target).await,
                Event::Exited(exit) => exit,
            };

            match exit {
                ChildExit::Success => {
                    info!(
                        name = %self.task.name,
                        program = %process.program(),
                        pid = ?process.pid(),
                        "Downloader exited ok"
                    );
                    return self.finish(Utc::now(), None);
                }
                ChildExit::Killed => {
                    let reason = if self.ctx.is_cancelled() {
                        CancelReason::Shutdown
                    } else {
                        CancelReason::Target
                    };
                    return self.stop(&process, reason).await;
                }
                ChildExit::Failed(code) => {
                    warn!(
                        name = %self.task.name,
                        program = %process.program(),
                        pid = ?process.pid(),
                        ?code,
                        "Downloader exited unexpectedly"
                    );
                }
            }

            self.tracked.set_status(SaveStatus::Recovering);
            let recovered = self
                .recovery
                .recover(&self.ctx, &self.cancel, self.tracked.target().as_ref())
                .await;

            match recovered {
                Ok(recovered) => {
                    match self
                        .downloader
                        .start(&self.ctx, &recovered.url, &self.task.name, &self.waiters)
                        .await
                    {
                        Ok(next) => {
                            process = next;
                            self.tracked.set_status(SaveStatus::Running);
                        }
                        Err(e) => {
                            error!(
                                name = %self.task.name,
                                error = %e,
                                "Failed to restart downloader"
                            );
                            return self.finish(Utc::now(), Some(e));
                        }
                    }
                }
                Err(RecoveryFailed {
                    error: Error::Cancelled,
                    ..
                }) => {
                    let reason = if self.ctx.is_cancelled() {
                        CancelReason::Shutdown
                    } else {
                        CancelReason::Target
                    };
                    return self.canceled(reason);
                }
                Err(RecoveryFailed { error, elapsed }) => {
                    // The stream really ended when recovery began.
                    let elapsed = chrono::Duration::from_std(elapsed)
                        .unwrap_or_else(|_| chrono::Duration::zero());
                    return self.finish(Utc::now() - elapsed, Some(error));
                }
            }
        }
    }

    async fn stop(&self, process: &DownloadProcess, reason: CancelReason) -> SaveOutcome {
        let exit = process.stop().await;
        info!(
            name = %self.task.name,
            program = %process.program(),
            pid = ?process.pid(),
            ?reason,
            ?exit,
            "Save canceled"
        );
        self.canceled(reason)
    }

    fn canceled(&self, reason: CancelReason) -> SaveOutcome {
        self.tracked.set_finished_at(Utc::now());
        self.tracked.set_status(SaveStatus::Canceled);
        self.tasks.release(&self.task);
        self.tracked.target().end_save(None);
        SaveOutcome::Canceled(reason)
    }

    fn finish(&self, at: DateTime<Utc>, error: Option<Error>) -> SaveOutcome {
        self.tracked.set_finished_at(at);
        self.tracked.set_status(SaveStatus::Finished);
        self.tasks.release(&self.task);
        self.tracked.target().end_save(error.as_ref());
        info!(name = %self.task.name, error = ?error, "Save finished");
        SaveOutcome::Finished { error }
    }
}
