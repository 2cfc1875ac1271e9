//! Generic module backed by `streamlink --stream-url`.
//!
//! Works for any site streamlink has a plugin for. Liveness is whatever
//! streamlink says it is: a printed url means live, "no playable streams"
//! means offline.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Options, keys};
use crate::track::{Module, Target};
use crate::utils::url::{last_path_segment, link_host, parse_link};
use crate::{Error, Result};

pub const MODULE_NAME: &str = "streamlink";

const QUALITY: &str = "best";

/// Map the result of `streamlink --stream-url` to a stream url.
pub fn interpret_output(name: &str, success: bool, stdout: &str, stderr: &str) -> Result<String> {
    if success {
        let url = stdout.trim();
        if url.is_empty() {
            return Err(Error::StreamUrlNotFound(name.to_string()));
        }
        return Ok(url.to_string());
    }

    // streamlink reports errors on either stream depending on version.
    let message = format!("{} {}", stdout.trim(), stderr.trim()).to_lowercase();
    if message.contains("no playable streams") || message.contains("no streams found") {
        return Err(Error::TargetNotLive(name.to_string()));
    }
    if message.contains("no plugin can handle") {
        return Err(Error::module(
            MODULE_NAME,
            format!("no plugin can handle {name}"),
        ));
    }
    Err(Error::module(MODULE_NAME, message.trim().to_string()))
}

/// Display name for a link: its last path segment, or its host.
fn target_name(link: &str) -> Result<String> {
    match last_path_segment(link) {
        Some(segment) => Ok(segment),
        None => link_host(link),
    }
}

/// A channel checked through streamlink.
pub struct StreamlinkTarget {
    link: String,
    name: String,
    program: String,
    timeout: Duration,
    saving: AtomicBool,
}

impl StreamlinkTarget {
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Target for StreamlinkTarget {
    fn link(&self) -> &str {
        &self.link
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn check_stream(&self, ctx: &CancellationToken) -> Result<String> {
        let mut cmd = process_utils::tokio_command(&self.program);
        cmd.arg("--stream-url")
            .arg(&self.link)
            .arg(QUALITY)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::select! {
            _ = ctx.cancelled() => return Err(Error::Cancelled),
            output = tokio::time::timeout(self.timeout, cmd.output()) => output,
        };
        let output = output
            .map_err(|_| Error::module(MODULE_NAME, format!("timed out checking {}", self.link)))?
            .map_err(|e| {
                Error::module(MODULE_NAME, format!("failed to run {}: {e}", self.program))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let result = interpret_output(&self.name, output.status.success(), &stdout, &stderr);
        debug!(name = %self.name, live = result.is_ok(), "Checked stream");
        result
    }

    fn begin_save(&self) {
        self.saving.store(true, Ordering::Release);
    }

    fn end_save(&self, error: Option<&Error>) {
        self.saving.store(false, Ordering::Release);
        if let Some(e) = error {
            debug!(name = %self.name, error = %e, "Recording ended with error");
        }
    }
}

/// Module owning every target checked through streamlink.
pub struct StreamlinkModule {
    program: String,
    hosts: Vec<String>,
    timeout: Duration,
    targets: RwLock<HashMap<String, Arc<StreamlinkTarget>>>,
}

impl StreamlinkModule {
    pub fn new(program: impl Into<String>, hosts: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            hosts,
            timeout,
            targets: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        let hosts = options.list(keys::STREAMLINK_HOSTS);
        if hosts.is_empty() {
            warn!("No streamlink hosts configured; every link will be rejected");
        }
        Ok(Self::new(
            options.get_or(keys::STREAMLINK_PATH, MODULE_NAME),
            hosts,
            options.duration_secs(keys::HTTP_TIMEOUT)?,
        ))
    }

    pub fn len(&self) -> usize {
        self.targets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.read().is_empty()
    }
}

#[async_trait]
impl Module for StreamlinkModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn hosts(&self) -> Vec<String> {
        self.hosts.clone()
    }

    async fn add_target(&self, _ctx: &CancellationToken, link: &str) -> Result<Arc<dyn Target>> {
        parse_link(link)?;
        let name = target_name(link)?;

        let mut targets = self.targets.write();
        let target: Arc<dyn Target> = targets
            .entry(link.to_string())
            .or_insert_with(|| {
                info!(name = %name, link = %link, "New streamlink target");
                Arc::new(StreamlinkTarget {
                    link: link.to_string(),
                    name,
                    program: self.program.clone(),
                    timeout: self.timeout,
                    saving: AtomicBool::new(false),
                })
            })
            .clone();
        Ok(target)
    }

    async fn remove_target(
        &self,
        _ctx: &CancellationToken,
        link: &str,
    ) -> Result<Arc<dyn Target>> {
        let removed = self.targets.write().remove(link);
        match removed {
            Some(target) => Ok(target as Arc<dyn Target>),
            None => Err(Error::module(MODULE_NAME, format!("unknown target {link}"))),
        }
    }
}
