//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path).

use std::path::Path;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error("creating directory", path, e))
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Whether something already exists at `path`.
pub async fn path_exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| io_error("checking", path, e))
}

/// Create an empty file at `path` unless one is already there.
pub async fn touch_if_missing(path: &Path) -> Result<()> {
    if path_exists(path).await? {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir_all(parent).await?;
    }
    tokio::fs::write(path, b"")
        .await
        .map_err(|e| io_error("creating file", path, e))
}
