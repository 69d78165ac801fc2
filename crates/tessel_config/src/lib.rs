//! Parsing and validation of `tessel.toml` simulation settings.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`SimConfig`]: settling and delta limits, same-instant tie-break order,
//! run bounds, and waveform output settings. Every field has a default, so an
//! empty file is a valid configuration.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
