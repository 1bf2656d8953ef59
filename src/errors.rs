// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only recoverable, user-facing failures live here. Contract violations in
//! the scheduler itself (duplicate insertion, cross-manager dependencies,
//! main-thread calls from another thread) are panics, not errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskctlError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("a process-wide task controller is already initialized")]
    AlreadyInitialized,

    #[error("an idle manager is already installed on this controller")]
    IdleManagerInstalled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskctlError>;
