//! Downloader process control.

mod process;

pub use process::{DownloadProcess, Downloader, DownloaderConfig};
pub use process_utils::ChildExit;
