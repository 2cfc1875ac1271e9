//! autosr library crate.
//!
//! Watches live stream targets and records them with an external downloader
//! while they are live.

pub mod api;
pub mod config;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod modules;
pub mod track;
pub mod utils;

pub use error::{Error, Result};

/// Build version, from `git describe` when available.
pub fn version() -> &'static str {
    env!("AUTOSR_VERSION")
}
