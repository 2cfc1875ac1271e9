//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid link '{link}': {reason}")]
    InvalidLink { link: String, reason: String },

    #[error("no link")]
    MissingLink,

    #[error("no stream url")]
    MissingStreamUrl,

    #[error("no module for host: {0}")]
    NoModuleForHost(String),

    #[error("we are not tracking this target: {0}")]
    NotTracked(String),

    #[error("target is not live: {0}")]
    TargetNotLive(String),

    #[error("did not find stream url: {0}")]
    StreamUrlNotFound(String),

    #[error("module {module}: {message}")]
    Module { module: String, message: String },

    #[error("downloader: {0}")]
    Process(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error while {op} '{}': {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid_link(link: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLink {
            link: link.into(),
            reason: reason.into(),
        }
    }

    pub fn module(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Module {
            module: module.into(),
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Input errors are rejected before anything is touched.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidLink { .. }
                | Self::MissingLink
                | Self::MissingStreamUrl
                | Self::NoModuleForHost(_)
        )
    }

    /// The target answered, it is just not streaming (yet).
    pub fn is_not_live(&self) -> bool {
        matches!(self, Self::TargetNotLive(_))
    }
}
