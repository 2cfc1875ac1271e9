//! Periodic liveness checks.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::TargetRegistry;
use crate::config::{Options, keys};
use crate::Result;

/// Checks every idle tracked target on a fixed interval.
#[derive(Debug, Clone)]
pub struct Poller {
    registry: Arc<TargetRegistry>,
    interval: Duration,
}

impl Poller {
    pub fn new(registry: Arc<TargetRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    pub fn from_options(registry: Arc<TargetRegistry>, options: &Options) -> Result<Self> {
        Ok(Self::new(
            registry,
            options.interval_secs(keys::CHECK_INTERVAL)?,
        ))
    }

    /// Start polling on the shutdown coordinator.
    pub fn spawn(self, ctx: CancellationToken) {
        let shutdown = self.registry.saver().shutdown().clone();
        shutdown.spawn(self.run(ctx));
    }

    /// Poll until `ctx` is cancelled.
    pub async fn run(self, ctx: CancellationToken) {
        info!(interval = ?self.interval, "Poller started");
        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    debug!("Poller shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    let spawned = self.poll_once(&ctx);
                    debug!(spawned, "Poll tick");
                }
            }
        }
    }

    /// Spawn a snipe for every tracked target that is neither being recorded
    /// nor being checked. Returns how many were spawned.
    pub fn poll_once(&self, ctx: &CancellationToken) -> usize {
        let saver = self.registry.saver();
        let mut spawned = 0;
        for tracked in self.registry.tracked() {
            if saver.is_saving(tracked.link()) || tracked.is_checking() {
                continue;
            }
            let registry = Arc::clone(&self.registry);
            let ctx = ctx.clone();
            saver.shutdown().spawn(async move {
                match registry.snipe(&ctx, &tracked).await {
                    Ok(Some(_)) => info!(name = %tracked.name(), "Live now"),
                    Ok(None) => {}
                    Err(e) => warn!(name = %tracked.name(), error = %e, "Check failed"),
                }
            });
            spawned += 1;
        }
        spawned
    }
}
