// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::resources::spec::ResourceSpecError;

#[derive(Error, Debug)]
pub enum TestschedError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Test not found: {0}")]
    TestNotFound(String),

    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Cycle detected in test dependency graph: {0}")]
    DependencyCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Could not read/parse resource spec file: {0}")]
    ResourceSpec(#[from] ResourceSpecError),

    #[error("timed out after {timeout:?} waiting for lock on {path:?}")]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TestschedError>;
