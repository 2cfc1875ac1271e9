//! The capability every trackable target provides.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// A remote entity, such as a channel, watched for live status.
///
/// Targets are created by a [`Module`](super::Module) and shared between the
/// module and the registry entry that tracks them, so all mutation goes
/// through `&self`.
#[async_trait]
pub trait Target: Send + Sync {
    /// Canonical link, used as the registry key.
    fn link(&self) -> &str;

    /// Display name, also used to name recordings.
    fn name(&self) -> &str;

    /// Check whether the target is live and resolve a playable stream url.
    ///
    /// Returns [`Error::TargetNotLive`] when offline and
    /// [`Error::StreamUrlNotFound`] when live without a usable stream yet.
    async fn check_stream(&self, ctx: &CancellationToken) -> Result<String>;

    /// Called once a recording has started.
    fn begin_save(&self) {}

    /// Called once a recording has ended, with the reason if it ended badly.
    fn end_save(&self, _error: Option<&Error>) {}

    /// Cancellation token of the current recording attempt.
    fn set_cancel(&self, _cancel: CancellationToken) {}

    fn set_started_at(&self, _at: DateTime<Utc>) {}

    fn set_finished_at(&self, _at: Option<DateTime<Utc>>) {}
}

/// Observable state of a tracked target's recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    /// Not recording.
    #[default]
    Idle,
    /// A save task was admitted and the downloader is starting.
    Admitted,
    /// The downloader is running.
    Running,
    /// The downloader exited unexpectedly; waiting for the stream to return.
    Recovering,
    /// The last recording ended on its own.
    Finished,
    /// The last recording was cancelled.
    Canceled,
}

impl SaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Admitted => "admitted",
            Self::Running => "running",
            Self::Recovering => "recovering",
            Self::Finished => "finished",
            Self::Canceled => "canceled",
        }
    }

    /// Whether a recording is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Admitted | Self::Running | Self::Recovering)
    }
}

impl std::fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one tracked target, as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub link: String,
    pub name: String,
    pub host: String,
    pub status: SaveStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}
