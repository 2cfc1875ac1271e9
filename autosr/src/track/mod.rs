//! Target tracking and save orchestration.
//!
//! - [`TargetRegistry`]: the tracked targets, keyed by link
//! - [`Saver`]: one recording per target, with recovery
//! - [`Poller`]: periodic liveness checks
//! - [`TrackList`]: the on-disk list of links to follow
//! - [`Shutdown`]: root cancellation and background task accounting

pub mod list;
pub mod module;
pub mod poll;
pub mod recovery;
pub mod registry;
pub mod save;
pub mod shutdown;
pub mod target;
pub mod task;
pub mod tracked;

pub use list::{ReloadSummary, TrackList, parse_list};
pub use module::{Module, ModuleRegistry};
pub use poll::Poller;
pub use recovery::{Recovered, Recovery, RecoveryFailed};
pub use registry::TargetRegistry;
pub use save::{CancelReason, SaveHandle, SaveOutcome, SaveStart, Saver};
pub use shutdown::{DEFAULT_SHUTDOWN_GRACE, DrainOutcome, Shutdown};
pub use target::{SaveStatus, Target, TargetInfo};
pub use task::{SaveTask, SaveTaskTable};
pub use tracked::Tracked;
