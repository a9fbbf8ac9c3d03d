//! Configuration system for Alcove.
//!
//! Provides compile-time constants and TOML config file support.

pub mod constants;
pub mod file;

pub use file::{ensure_config_file, load_config, watch_config, Config};
