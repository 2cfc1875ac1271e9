//! External downloader process.
//!
//! The downloader is invoked with streamlink-style arguments and writes a
//! single `.ts` file into the target's own directory under `save_to`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Local;
use process_utils::{ChildExit, SupervisedChild, supervise};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::{Options, keys};
use crate::utils::filename::{dated_stem, sanitize_filename, unique_file_name};
use crate::utils::fs::ensure_dir_all;
use crate::{Error, Result};

/// Quality passed to the downloader.
const QUALITY: &str = "best";

/// Settings for launching the downloader.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub program: String,
    pub save_to: PathBuf,
    pub user_agent: String,
    pub segment_threads: usize,
    pub segment_timeout: Duration,
    pub http_timeout: Duration,
}

impl DownloaderConfig {
    pub fn from_options(options: &Options) -> Result<Self> {
        let program = options.get(keys::DOWNLOAD_WITH);
        if program.trim().is_empty() {
            return Err(Error::config("download_with is empty"));
        }
        Ok(Self {
            program,
            save_to: PathBuf::from(options.get(keys::SAVE_TO)),
            user_agent: options.get(keys::USER_AGENT),
            segment_threads: options.usize(keys::SEGMENT_THREADS)?,
            segment_timeout: options.duration_secs(keys::SEGMENT_TIMEOUT)?,
            http_timeout: options.duration_secs(keys::HTTP_TIMEOUT)?,
        })
    }
}

/// Launches downloader processes.
#[derive(Debug, Clone)]
pub struct Downloader {
    config: DownloaderConfig,
}

impl Downloader {
    pub fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        DownloaderConfig::from_options(options).map(Self::new)
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Directory recordings of `name` are written to.
    pub fn output_dir(&self, name: &str) -> PathBuf {
        self.config.save_to.join(sanitize_filename(name))
    }

    /// Create the output directory and pick a free file name in it for a
    /// recording of `name` starting today.
    pub async fn prepare_output(&self, name: &str) -> Result<(PathBuf, String)> {
        let dir = self.output_dir(name);
        ensure_dir_all(&dir).await?;
        let stem = dated_stem(Local::now().date_naive(), &sanitize_filename(name));
        let file_name = unique_file_name(&dir, &stem).await?;
        Ok((dir, file_name))
    }

    /// Downloader arguments for recording `url` into `file_name`.
    pub fn build_args(&self, url: &str, file_name: &str) -> Vec<String> {
        vec![
            "--hls-segment-threads".to_string(),
            self.config.segment_threads.to_string(),
            "--hls-segment-timeout".to_string(),
            self.config.segment_timeout.as_secs().to_string(),
            "--http-timeout".to_string(),
            self.config.http_timeout.as_secs().to_string(),
            "--http-header".to_string(),
            format!("User-Agent={}", self.config.user_agent),
            "-o".to_string(),
            file_name.to_string(),
            format!("hlsvariant://{url}"),
            QUALITY.to_string(),
        ]
    }

    /// Start recording `url` for the target called `name`.
    ///
    /// The process is killed when `ctx` is cancelled, independent of whoever
    /// holds the returned handle. Its waiter task is spawned on `waiters`.
    pub async fn start(
        &self,
        ctx: &CancellationToken,
        url: &str,
        name: &str,
        waiters: &TaskTracker,
    ) -> Result<DownloadProcess> {
        if url.is_empty() {
            return Err(Error::MissingStreamUrl);
        }

        let (dir, file_name) = self.prepare_output(name).await?;
        let args = self.build_args(url, &file_name);
        debug!(program = %self.config.program, ?args, dir = %dir.display(), "Spawning downloader");

        let mut command = process_utils::tokio_command(&self.config.program);
        command
            .args(&args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            Error::Process(format!("failed to spawn {}: {}", self.config.program, e))
        })?;
        let child = supervise(child, ctx.child_token(), waiters);

        let output = dir.join(&file_name);
        info!(
            name = %name,
            program = %self.config.program,
            pid = ?child.pid(),
            output = %output.display(),
            "Downloader started"
        );

        Ok(DownloadProcess {
            program: self.config.program.clone(),
            output,
            child,
        })
    }
}

/// A running downloader.
#[derive(Debug, Clone)]
pub struct DownloadProcess {
    program: String,
    output: PathBuf,
    child: SupervisedChild,
}

impl DownloadProcess {
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.pid()
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Kill the process. Safe to call more than once and after exit.
    pub fn kill(&self) {
        self.child.kill();
    }

    pub async fn wait(&self) -> ChildExit {
        self.child.wait().await
    }

    /// Kill the process and wait until it is gone.
    pub async fn stop(&self) -> ChildExit {
        self.kill();
        self.wait().await
    }
}
