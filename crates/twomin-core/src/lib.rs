//! twomin core - Shared functionality for the twomin focus timer
//!
//! Standard paths, the JSON configuration file and the human-readable
//! duration formatting used by both the library and the CLI.

pub mod config;
pub mod format;
pub mod paths;

pub use config::Config;
pub use paths::Paths;
