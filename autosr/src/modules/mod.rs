//! Site modules shipped with the binary.

pub mod streamlink;

use std::sync::Arc;

use crate::Result;
use crate::config::Options;
use crate::track::ModuleRegistry;

pub use streamlink::{StreamlinkModule, StreamlinkTarget};

/// Registry with every built-in module, configured from `options`.
pub fn builtin(options: &Options) -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(StreamlinkModule::from_options(options)?));
    Ok(registry)
}
