//! Process-level configuration.
//!
//! Everything the tracker needs from its environment is looked up by key
//! through [`Options`].

pub mod options;

pub use options::{Options, keys};
