// src/config/mod.rs

//! Configuration loading and validation for healtrack.
//!
//! - [`model`] holds the TOML-backed raw model and the validated config.
//! - [`loader`] reads a config file from disk.
//! - [`validate`] turns a raw config into a validated [`ConfigFile`].
//! - [`duration`] parses the short duration strings used in the file.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    ConfigFile, HistorySection, RawConfigFile, RunnerConfig, RunnerSection, ServerSection,
    WatchdogSection,
};
