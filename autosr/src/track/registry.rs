//! The table of tracked targets.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::module::ModuleRegistry;
use super::save::{SaveStart, Saver};
use super::target::TargetInfo;
use super::tracked::Tracked;
use crate::{Error, Result};

/// Tracked targets keyed by link.
///
/// The lock is only held for map access; module calls and liveness checks
/// run without it.
pub struct TargetRegistry {
    modules: ModuleRegistry,
    targets: RwLock<HashMap<String, Arc<Tracked>>>,
    saver: Arc<Saver>,
}

impl TargetRegistry {
    pub fn new(modules: ModuleRegistry, saver: Arc<Saver>) -> Self {
        Self {
            modules,
            targets: RwLock::new(HashMap::new()),
            saver,
        }
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn saver(&self) -> &Arc<Saver> {
        &self.saver
    }

    /// Start tracking `link`.
    ///
    /// Adding a link that is already tracked does nothing. A new target is
    /// checked right away and recorded if it is live.
    pub async fn add_target(&self, ctx: &CancellationToken, link: &str) -> Result<()> {
        let link = link.trim();
        if self.contains(link) {
            debug!(link = %link, "Already tracking");
            return Ok(());
        }

        let (host, module) = self.modules.find_for_link(link)?;
        let target = module.add_target(ctx, link).await?;
        let tracked = Arc::new(Tracked::new(target, host.clone()));

        {
            let mut targets = self.targets.write();
            match targets.entry(tracked.link().to_string()) {
                Entry::Occupied(_) => {
                    debug!(link = %link, "Target was added concurrently");
                    return Ok(());
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&tracked));
                }
            }
        }
        info!(host = %host, link = %link, name = %tracked.name(), "Tracking target");

        match self.snipe(ctx, &tracked).await {
            Ok(Some(_)) => info!(name = %tracked.name(), "Live now"),
            Ok(None) => {}
            Err(e) => warn!(name = %tracked.name(), error = %e, "Snipe failed"),
        }

        Ok(())
    }

    /// Stop tracking `link`.
    ///
    /// The entry is removed and its recording cancelled even when the module
    /// fails to remove the target; that failure is still returned.
    pub async fn remove_target(&self, ctx: &CancellationToken, link: &str) -> Result<()> {
        let link = link.trim();
        if !self.contains(link) {
            return Err(Error::NotTracked(link.to_string()));
        }

        let removed_by_module = match self.modules.find_for_link(link) {
            Ok((_, module)) => module.remove_target(ctx, link).await.map(|_| ()),
            Err(e) => Err(e),
        };

        let removed = self.targets.write().remove(link);
        if let Some(tracked) = removed {
            tracked.retire();
            info!(host = %tracked.host(), link = %link, "Stopped tracking target");
        }

        if let Err(e) = &removed_by_module {
            warn!(link = %link, error = %e, "Module failed to remove target");
        }
        removed_by_module
    }

    /// Cancel the current recording of `link`, keeping it tracked.
    pub fn cancel_target(&self, link: &str) -> Result<()> {
        let link = link.trim();
        let tracked = self
            .get(link)
            .ok_or_else(|| Error::NotTracked(link.to_string()))?;
        info!(name = %tracked.name(), "Cancelling recording");
        tracked.cancel();
        Ok(())
    }

    pub fn get(&self, link: &str) -> Option<Arc<Tracked>> {
        self.targets.read().get(link).cloned()
    }

    pub fn contains(&self, link: &str) -> bool {
        self.targets.read().contains_key(link)
    }

    /// Snapshot of every tracked entry.
    pub fn tracked(&self) -> Vec<Arc<Tracked>> {
        self.targets.read().values().cloned().collect()
    }

    /// Snapshot of every tracked target, sorted by link.
    pub fn list(&self) -> Vec<TargetInfo> {
        let mut infos: Vec<TargetInfo> = self.targets.read().values().map(|t| t.info()).collect();
        infos.sort_by(|a, b| a.link.cmp(&b.link));
        infos
    }

    /// Tracked links, sorted.
    pub fn links(&self) -> Vec<String> {
        let mut links: Vec<String> = self.targets.read().keys().cloned().collect();
        links.sort();
        links
    }

    pub fn len(&self) -> usize {
        self.targets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.read().is_empty()
    }

    /// Check `tracked` now and start recording it if it is live.
    ///
    /// Returns `Ok(None)` when the target is offline, has no stream url yet,
    /// is already being checked or recorded, or was cancelled or removed while
    /// it was being checked.
    pub async fn snipe(
        &self,
        ctx: &CancellationToken,
        tracked: &Arc<Tracked>,
    ) -> Result<Option<SaveStart>> {
        if self.saver.is_saving(tracked.link()) {
            return Ok(None);
        }
        if !tracked.try_begin_check() {
            debug!(name = %tracked.name(), "Check already in flight");
            return Ok(None);
        }
        // The slot is held until the save is admitted so no other attempt
        // can swap the cancellation token in between.
        let sniped = self.check_and_start(ctx, tracked).await;
        tracked.end_check();
        sniped
    }

    async fn check_and_start(
        &self,
        ctx: &CancellationToken,
        tracked: &Arc<Tracked>,
    ) -> Result<Option<SaveStart>> {
        if self.saver.is_saving(tracked.link()) {
            return Ok(None);
        }
        // Issued before the check so a remove or cancel during it reaches
        // this attempt.
        let cancel = tracked.renew_cancel();
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let url = match tracked.target().check_stream(ctx).await {
            Ok(url) => url,
            Err(Error::TargetNotLive(_)) => return Ok(None),
            Err(Error::StreamUrlNotFound(_)) => {
                debug!(name = %tracked.name(), "Live but no stream url yet");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if cancel.is_cancelled() {
            debug!(name = %tracked.name(), "Cancelled while checking");
            return Ok(None);
        }

        tracked.set_started_at(Utc::now());
        match self.saver.start_attempt(ctx, tracked, &url, cancel).await? {
            SaveStart::Canceled => Ok(None),
            start => Ok(Some(start)),
        }
    }
}

impl std::fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetRegistry")
            .field("hosts", &self.modules.hosts())
            .field("tracking", &self.len())
            .finish()
    }
}
