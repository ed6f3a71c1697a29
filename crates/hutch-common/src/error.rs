//! Unified error type for the hutch workspace.
//!
//! Library crates return [`HutchError`] through the [`Result`] alias; only
//! the CLI layer converts into `anyhow`.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ContainerStatus;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HutchError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration or user-supplied value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A permission or capability error.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// A system call used for isolation failed.
    #[error("{call} failed: {message}")]
    Syscall {
        /// Name of the failing call (`mount`, `pivot_root`, `clone`, ...).
        call: &'static str,
        /// Detail including the affected path or argument.
        message: String,
    },

    /// A cgroup subsystem operation failed.
    #[error("cgroup {subsystem} {operation} failed: {message}")]
    Cgroup {
        /// Subsystem name (`cpu`, `cpuset`, `memory`).
        subsystem: &'static str,
        /// Operation name (`set`, `apply`, `remove`).
        operation: &'static str,
        /// Failure detail.
        message: String,
    },

    /// A lifecycle precondition was not met.
    #[error("cannot {operation} container {name}: status is {status}")]
    InvalidState {
        /// Container name.
        name: String,
        /// Status found in the registry.
        status: ContainerStatus,
        /// Rejected operation.
        operation: &'static str,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl HutchError {
    /// Builds an [`HutchError::Io`] bound to `path`.
    ///
    /// Meant for `map_err` chains: `fs::write(&p, v).map_err(HutchError::io(&p))`.
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HutchError>;
