//! Core library for the stackenv CLI
//!
//! This crate contains the environment initialization orchestrator and the
//! pieces it is built from: meta reconstruction, plugin hook resolution,
//! sequential task execution, phase timing, logging, and error handling.

pub mod config;
pub mod context;
pub mod errors;
pub mod init_env;
pub mod logging;
pub mod merge;
pub mod meta;
pub mod params;
pub mod plugins;
pub mod progress;
pub mod status;
pub mod task;
pub mod timer;
pub mod ui;

// Re-export IndexMap for use by dependent crates (preserves insertion order for ordered maps)
pub use indexmap::IndexMap;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
