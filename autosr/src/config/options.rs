//! Key/value options.
//!
//! Options are resolved in layers: built-in defaults, then `AUTOSR_<KEY>`
//! environment variables (a `.env` file is loaded into the environment first).
//! Consumers treat the store as opaque key lookups.

use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;

use crate::{Error, Result};

/// Environment variable prefix for option overrides.
pub const ENV_PREFIX: &str = "AUTOSR_";

/// Known option keys.
pub mod keys {
    pub const SAVE_TO: &str = "save_to";
    pub const USER_AGENT: &str = "user_agent";
    pub const DOWNLOAD_WITH: &str = "download_with";
    pub const SEGMENT_THREADS: &str = "segment_threads";
    pub const SEGMENT_TIMEOUT: &str = "segment_timeout";
    pub const HTTP_TIMEOUT: &str = "http_timeout";
    pub const CHECK_INTERVAL: &str = "check_interval";
    pub const RECOVER_TIMEOUT: &str = "recover_timeout";
    pub const RECOVER_POLL_INTERVAL: &str = "recover_poll_interval";
    pub const SHUTDOWN_GRACE: &str = "shutdown_grace";
    pub const TRACK_LIST: &str = "track_list";
    pub const LOG_DIR: &str = "log_dir";
    pub const LISTEN_ADDR: &str = "listen_addr";
    pub const STREAMLINK_PATH: &str = "streamlink_path";
    pub const STREAMLINK_HOSTS: &str = "streamlink_hosts";

    pub const ALL: &[&str] = &[
        SAVE_TO,
        USER_AGENT,
        DOWNLOAD_WITH,
        SEGMENT_THREADS,
        SEGMENT_TIMEOUT,
        HTTP_TIMEOUT,
        CHECK_INTERVAL,
        RECOVER_TIMEOUT,
        RECOVER_POLL_INTERVAL,
        SHUTDOWN_GRACE,
        TRACK_LIST,
        LOG_DIR,
        LISTEN_ADDR,
        STREAMLINK_PATH,
        STREAMLINK_HOSTS,
    ];
}

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

fn defaults() -> HashMap<String, String> {
    [
        (keys::SAVE_TO, "./recordings"),
        (keys::USER_AGENT, DEFAULT_USER_AGENT),
        (keys::DOWNLOAD_WITH, "streamlink"),
        (keys::SEGMENT_THREADS, "4"),
        (keys::SEGMENT_TIMEOUT, "30"),
        (keys::HTTP_TIMEOUT, "60"),
        (keys::CHECK_INTERVAL, "30"),
        (keys::RECOVER_TIMEOUT, "300"),
        (keys::RECOVER_POLL_INTERVAL, "5"),
        (keys::SHUTDOWN_GRACE, "5"),
        (keys::TRACK_LIST, "./track_list"),
        (keys::LOG_DIR, "./logs"),
        (keys::LISTEN_ADDR, "127.0.0.1:12556"),
        (keys::STREAMLINK_PATH, "streamlink"),
        (keys::STREAMLINK_HOSTS, ""),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Opaque key/value configuration store.
#[derive(Debug, Clone)]
pub struct Options {
    values: HashMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Self { values: defaults() }
    }
}

impl Options {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            warn!("Failed to load .env file: {}", e);
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by `lookup(AUTOSR_<KEY>)` for every known key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        for key in keys::ALL {
            let name = format!("{ENV_PREFIX}{}", key.to_ascii_uppercase());
            if let Some(value) = lookup(&name) {
                options.set(*key, value);
            }
        }
        options
    }

    /// Defaults overridden by the given pairs.
    pub fn with_values<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut options = Self::default();
        for (k, v) in pairs {
            options.set(k, v);
        }
        options
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Value for `key`, or an empty string when unset.
    pub fn get(&self, key: &str) -> String {
        self.values.get(key).cloned().unwrap_or_default()
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(v) if !v.trim().is_empty() => v.clone(),
            _ => default.to_string(),
        }
    }

    /// A whole number of seconds.
    pub fn duration_secs(&self, key: &str) -> Result<Duration> {
        self.number::<u64>(key).map(Duration::from_secs)
    }

    /// A whole, non-zero number of seconds between repeated work.
    pub fn interval_secs(&self, key: &str) -> Result<Duration> {
        match self.duration_secs(key)? {
            Duration::ZERO => Err(Error::config(format!("option '{key}' must be at least 1"))),
            interval => Ok(interval),
        }
    }

    pub fn usize(&self, key: &str) -> Result<usize> {
        self.number(key)
    }

    /// Comma-separated list; blank items are dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        let raw = self.get(key);
        raw.trim()
            .parse::<T>()
            .map_err(|e| Error::config(format!("option '{key}' = '{raw}': {e}")))
    }
}
