//! The track list: a plain text file of links to follow.
//!
//! One link per line. Blank lines and lines starting with `#` are skipped.
//! The registry is reconciled with the file on start and whenever the file
//! changes on disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::TargetRegistry;
use crate::config::{Options, keys};
use crate::utils::fs::{io_error, touch_if_missing};
use crate::{Error, Result};

/// Quiet period after a change before the file is read, so a burst of
/// events from one save triggers one reload.
const SETTLE: Duration = Duration::from_millis(200);

/// Links listed in `content`, in order, without duplicates.
pub fn parse_list(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect()
}

/// What a reload changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

pub struct TrackList {
    path: PathBuf,
    registry: Arc<TargetRegistry>,
    reloading: Mutex<()>,
}

impl TrackList {
    pub fn new(path: impl Into<PathBuf>, registry: Arc<TargetRegistry>) -> Self {
        Self {
            path: path.into(),
            registry,
            reloading: Mutex::new(()),
        }
    }

    pub fn from_options(options: &Options, registry: Arc<TargetRegistry>) -> Self {
        Self::new(options.get(keys::TRACK_LIST), registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the list file empty if it does not exist.
    pub async fn ensure_exists(&self) -> Result<()> {
        touch_if_missing(&self.path).await
    }

    /// Links currently in the file. A missing file lists nothing.
    pub async fn read(&self) -> Result<Vec<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(parse_list(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Track list does not exist");
                Ok(Vec::new())
            }
            Err(e) => Err(io_error("reading track list", &self.path, e)),
        }
    }

    /// Add every listed link that is not tracked and remove every tracked
    /// link that is no longer listed. Individual failures are logged.
    pub async fn reload(&self, ctx: &CancellationToken) -> Result<ReloadSummary> {
        let _guard = self.reloading.lock().await;
        let listed = self.read().await?;
        let mut summary = ReloadSummary::default();

        for link in &listed {
            if self.registry.contains(link) {
                continue;
            }
            match self.registry.add_target(ctx, link).await {
                Ok(()) => summary.added.push(link.clone()),
                Err(e) => {
                    warn!(link = %link, error = %e, "Failed to add target from track list");
                    summary.failed.push(link.clone());
                }
            }
        }

        let wanted: HashSet<&str> = listed.iter().map(String::as_str).collect();
        for link in self.registry.links() {
            if wanted.contains(link.as_str()) {
                continue;
            }
            match self.registry.remove_target(ctx, &link).await {
                Ok(()) => summary.removed.push(link),
                Err(Error::NotTracked(_)) => {}
                Err(e) => {
                    // The entry is gone either way.
                    warn!(link = %link, error = %e, "Module failed to remove target");
                    summary.removed.push(link);
                }
            }
        }

        info!(
            tracking = self.registry.len(),
            added = summary.added.len(),
            removed = summary.removed.len(),
            failed = summary.failed.len(),
            "Track list loaded"
        );
        Ok(summary)
    }

    /// Directory watched for changes to the list file.
    fn watch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Whether `event` touches the list file.
    fn is_relevant(&self, event: &Event) -> bool {
        let interesting = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        );
        let Some(file_name) = self.path.file_name() else {
            return false;
        };
        interesting
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(file_name))
    }

    /// Reload whenever the list file changes, until `ctx` is cancelled.
    pub fn watch(self: &Arc<Self>, ctx: CancellationToken) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            })
            .map_err(|e| Error::Other(format!("cannot create track list watcher: {e}")))?;

        let dir = self.watch_dir();
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Other(format!("cannot watch {}: {e}", dir.display())))?;
        info!(path = %self.path.display(), "Watching track list");

        let list = Arc::clone(self);
        let shutdown = self.registry.saver().shutdown().clone();
        shutdown.spawn(async move {
            // Dropping the watcher stops the events.
            let _watcher = watcher;
            loop {
                let event = tokio::select! {
                    _ = ctx.cancelled() => break,
                    event = rx.recv() => event,
                };
                match event {
                    None => break,
                    Some(Err(e)) => warn!(error = %e, "Track list watcher error"),
                    Some(Ok(event)) if list.is_relevant(&event) => {
                        debug!(kind = ?event.kind, "Track list changed");
                        tokio::select! {
                            _ = ctx.cancelled() => break,
                            _ = tokio::time::sleep(SETTLE) => {}
                        }
                        while rx.try_recv().is_ok() {}
                        if let Err(e) = list.reload(&ctx).await {
                            warn!(error = %e, "Failed to reload track list");
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
            debug!("Track list watcher stopped");
        });
        Ok(())
    }
}

impl std::fmt::Debug for TrackList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackList").field("path", &self.path).finish()
    }
}
