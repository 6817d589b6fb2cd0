// src/errors.rs

//! Crate-wide error types.
//!
//! [`LaunchError`] covers everything that can go wrong inside the daemon
//! itself. [`StatusCode`] is the smaller, serializable set of failures that
//! request callers get to see.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("job queue is closed")]
    QueueClosed,

    #[error("Launch failed: {0}")]
    Launch(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Failure status returned across the request boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    #[error("name not found")]
    NameNotFound,
    #[error("bad value")]
    BadValue,
    #[error("operation not allowed")]
    NotAllowed,
    #[error("permission denied")]
    PermissionDenied,
    #[error("not initialized")]
    NoInit,
    #[error("busy")]
    Busy,
    #[error("out of memory")]
    NoMemory,
    #[error("{0}")]
    Error(String),
}
