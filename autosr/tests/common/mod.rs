//! Shared fixtures for integration tests.
//!
//! Downloaders are stand-in shell scripts, so most tests here are unix only.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use autosr::config::{Options, keys};
use autosr::downloader::Downloader;
use autosr::track::{
    Module, ModuleRegistry, Recovery, Saver, Shutdown, Target, TargetRegistry, Tracked,
};
use autosr::{Error, Result};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const HOST: &str = "example.com";

pub fn link(name: &str) -> String {
    format!("https://{HOST}/{name}")
}

/// Scripted liveness answers for one target.
#[derive(Debug, Clone)]
pub enum Check {
    Live(String),
    Offline,
    NoUrl,
}

impl Check {
    fn answer(&self, name: &str) -> Result<String> {
        match self {
            Self::Live(url) => Ok(url.clone()),
            Self::Offline => Err(Error::TargetNotLive(name.to_string())),
            Self::NoUrl => Err(Error::StreamUrlNotFound(name.to_string())),
        }
    }
}

/// Target whose checks follow a script and whose save hooks are counted.
pub struct MockTarget {
    link: String,
    name: String,
    script: Mutex<VecDeque<Check>>,
    fallback: Mutex<Check>,
    delay: Mutex<Duration>,
    pub checks: AtomicUsize,
    pub begins: AtomicUsize,
    pub ends: AtomicUsize,
    pub last_error: Mutex<Option<String>>,
}

impl MockTarget {
    pub fn new(name: &str, fallback: Check) -> Arc<Self> {
        Arc::new(Self {
            link: link(name),
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            delay: Mutex::new(Duration::ZERO),
            checks: AtomicUsize::new(0),
            begins: AtomicUsize::new(0),
            ends: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        })
    }

    pub fn live(name: &str) -> Arc<Self> {
        Self::new(name, Check::Live(format!("cdn.{HOST}/{name}.m3u8")))
    }

    pub fn offline(name: &str) -> Arc<Self> {
        Self::new(name, Check::Offline)
    }

    /// Answer the next checks with `checks`, then with the fallback.
    pub fn script(&self, checks: impl IntoIterator<Item = Check>) {
        self.script.lock().extend(checks);
    }

    pub fn set_fallback(&self, check: Check) {
        *self.fallback.lock() = check;
    }

    /// Make every check take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn ends(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Target for MockTarget {
    fn link(&self) -> &str {
        &self.link
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn check_stream(&self, _ctx: &CancellationToken) -> Result<String> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        let check = next.unwrap_or_else(|| self.fallback.lock().clone());
        check.answer(&self.name)
    }

    fn begin_save(&self) {
        self.begins.fetch_add(1, Ordering::SeqCst);
    }

    fn end_save(&self, error: Option<&Error>) {
        *self.last_error.lock() = error.map(|e| e.to_string());
        self.ends.fetch_add(1, Ordering::SeqCst);
    }
}

/// Module serving prepared targets for [`HOST`].
#[derive(Default)]
pub struct MockModule {
    prepared: Mutex<HashMap<String, Arc<MockTarget>>>,
    pub adds: AtomicUsize,
    pub removes: AtomicUsize,
    pub fail_remove: std::sync::atomic::AtomicBool,
}

impl MockModule {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hand out `target` when its link is added.
    pub fn prepare(&self, target: Arc<MockTarget>) {
        self.prepared
            .lock()
            .insert(target.link().to_string(), target);
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Module for MockModule {
    fn name(&self) -> &str {
        "mock"
    }

    fn hosts(&self) -> Vec<String> {
        vec![HOST.to_string()]
    }

    async fn add_target(&self, _ctx: &CancellationToken, link: &str) -> Result<Arc<dyn Target>> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        let mut prepared = self.prepared.lock();
        let target = prepared.entry(link.to_string()).or_insert_with(|| {
            let name = link.rsplit('/').next().unwrap_or("unnamed");
            MockTarget::offline(name)
        });
        Ok(Arc::clone(target) as Arc<dyn Target>)
    }

    async fn remove_target(
        &self,
        _ctx: &CancellationToken,
        link: &str,
    ) -> Result<Arc<dyn Target>> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Error::module("mock", format!("cannot remove {link}")));
        }
        self.prepared
            .lock()
            .get(link)
            .map(|t| Arc::clone(t) as Arc<dyn Target>)
            .ok_or_else(|| Error::module("mock", format!("unknown target {link}")))
    }
}

/// Body of a stand-in downloader that creates its `-o` file first.
fn script_body(tail: &str) -> String {
    format!(
        "#!/bin/sh\n\
         out=\"\"\n\
         while [ $# -gt 0 ]; do\n\
         \x20 if [ \"$1\" = \"-o\" ]; then out=\"$2\"; fi\n\
         \x20 shift\n\
         done\n\
         if [ -n \"$out\" ]; then : > \"$out\"; fi\n\
         {tail}\n"
    )
}

/// Write an executable stand-in downloader into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, tail: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, script_body(tail)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Downloader that records until killed.
#[cfg(unix)]
pub fn sleeper(dir: &Path) -> PathBuf {
    write_script(dir, "sleeper.sh", "exec sleep 30")
}

/// Downloader that records until killed and leaves its pid in `pid_file`.
#[cfg(unix)]
pub fn pid_sleeper(dir: &Path, pid_file: &Path) -> PathBuf {
    write_script(
        dir,
        "pid_sleeper.sh",
        &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
    )
}

/// Downloader that finishes the recording right away.
#[cfg(unix)]
pub fn quick(dir: &Path) -> PathBuf {
    write_script(dir, "quick.sh", "exit 0")
}

/// Downloader that always fails.
#[cfg(unix)]
pub fn failing(dir: &Path) -> PathBuf {
    write_script(dir, "failing.sh", "exit 1")
}

/// Downloader that fails on its first run and records until killed after.
/// Every run appends a line to `runs`.
#[cfg(unix)]
pub fn flaky(dir: &Path, runs: &Path) -> PathBuf {
    let runs = runs.display();
    write_script(
        dir,
        "flaky.sh",
        &format!(
            "echo run >> '{runs}'\n\
             if [ $(( $(wc -l < '{runs}') )) -le 1 ]; then exit 1; fi\n\
             exec sleep 30"
        ),
    )
}

/// Lines written to a `runs` file by [`flaky`].
pub fn run_count(runs: &Path) -> usize {
    std::fs::read_to_string(runs)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

/// Recording settings writing into `dir/recordings` with `program`.
pub fn options(dir: &TempDir, program: &Path) -> Options {
    Options::with_values([
        (
            keys::SAVE_TO,
            dir.path().join("recordings").to_string_lossy().to_string(),
        ),
        (keys::DOWNLOAD_WITH, program.to_string_lossy().to_string()),
    ])
}

/// Recovery short enough for tests.
pub fn fast_recovery() -> Recovery {
    Recovery::new(Duration::from_millis(300), Duration::from_millis(20))
}

pub fn saver(dir: &TempDir, program: &Path, shutdown: Shutdown) -> Arc<Saver> {
    let downloader = Downloader::from_options(&options(dir, program)).unwrap();
    Arc::new(Saver::new(downloader, fast_recovery(), shutdown))
}

pub fn registry(module: Arc<MockModule>, saver: Arc<Saver>) -> Arc<TargetRegistry> {
    let modules = ModuleRegistry::new().with_module(module);
    Arc::new(TargetRegistry::new(modules, saver))
}

pub fn tracked(target: Arc<MockTarget>) -> Arc<Tracked> {
    Arc::new(Tracked::new(target, HOST))
}

/// Poll `cond` until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
