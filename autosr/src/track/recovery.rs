//! Waiting for an interrupted stream to come back.
//!
//! Recovery runs in two bounded phases. The first waits for the target to
//! report it is live at all; the second waits for a playable stream url, with
//! a window of its own. A url obtained in the first phase ends recovery early.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::target::Target;
use crate::config::{Options, keys};
use crate::{Error, Result};

/// Default bound of each recovery phase.
pub const DEFAULT_RECOVER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default pause between liveness checks while recovering.
pub const DEFAULT_RECOVER_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A recovered stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub url: String,
    pub elapsed: Duration,
}

/// Why recovery ended without a stream, and how long it tried.
#[derive(Debug)]
pub struct RecoveryFailed {
    pub error: Error,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct Recovery {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new(DEFAULT_RECOVER_TIMEOUT, DEFAULT_RECOVER_POLL_INTERVAL)
    }
}

enum Phase {
    /// Live, maybe with a url already.
    Live(Option<String>),
    Url(String),
}

impl Recovery {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        Ok(Self::new(
            options.duration_secs(keys::RECOVER_TIMEOUT)?,
            options.interval_secs(keys::RECOVER_POLL_INTERVAL)?,
        ))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for `target` to come back, giving up on `ctx` or `cancel`.
    pub async fn recover(
        &self,
        ctx: &CancellationToken,
        cancel: &CancellationToken,
        target: &dyn Target,
    ) -> std::result::Result<Recovered, RecoveryFailed> {
        let began = Instant::now();
        let name = target.name();
        info!(name = %name, "Recovery started");

        let result = self.run(ctx, cancel, target).await;
        let elapsed = began.elapsed();
        match result {
            Ok(url) => {
                info!(name = %name, ?elapsed, "Recovered");
                Ok(Recovered { url, elapsed })
            }
            Err(error) => {
                info!(name = %name, ?elapsed, error = %error, "Recovery failed");
                Err(RecoveryFailed { error, elapsed })
            }
        }
    }

    async fn run(
        &self,
        ctx: &CancellationToken,
        cancel: &CancellationToken,
        target: &dyn Target,
    ) -> Result<String> {
        let name = target.name().to_string();

        let live = self
            .poll(ctx, cancel, target, |result| match result {
                Ok(url) if !url.is_empty() => Some(Phase::Live(Some(url))),
                Ok(_) | Err(Error::StreamUrlNotFound(_)) => Some(Phase::Live(None)),
                Err(_) => None,
            })
            .await?
            .ok_or_else(|| Error::TargetNotLive(name.clone()))?;

        if let Phase::Live(Some(url)) = live {
            return Ok(url);
        }
        debug!(name = %name, "Target is live, waiting for a stream url");

        let found = self
            .poll(ctx, cancel, target, |result| match result {
                Ok(url) if !url.is_empty() => Some(Phase::Url(url)),
                _ => None,
            })
            .await?;
        match found {
            Some(Phase::Url(url)) => Ok(url),
            _ => Err(Error::StreamUrlNotFound(name)),
        }
    }

    /// Check `target` every poll interval until `accept` takes a result or
    /// one timeout window passes. `Ok(None)` means the window ran out.
    async fn poll<F>(
        &self,
        ctx: &CancellationToken,
        cancel: &CancellationToken,
        target: &dyn Target,
        accept: F,
    ) -> Result<Option<Phase>>
    where
        F: Fn(Result<String>) -> Option<Phase>,
    {
        let deadline = Instant::now() + self.timeout;
        loop {
            let check = tokio::select! {
                _ = ctx.cancelled() => return Err(Error::Cancelled),
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
                result = target.check_stream(ctx) => result,
            };
            if let Some(phase) = accept(check) {
                return Ok(Some(phase));
            }

            let next = Instant::now() + self.poll_interval;
            if next >= deadline {
                return Ok(None);
            }
            tokio::select! {
                _ = ctx.cancelled() => return Err(Error::Cancelled),
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep_until(next) => {}
            }
        }
    }
}
