// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HealtrackError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Engine is not running")]
    EngineUnavailable,

    #[error("Unknown execution: {0}")]
    ExecutionNotFound(String),

    #[error("Push channel error: {0}")]
    Stream(#[from] crate::stream::StreamError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HealtrackError>;
