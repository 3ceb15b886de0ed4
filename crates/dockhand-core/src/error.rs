//! Error types for the sidecar library.

use std::path::PathBuf;

use thiserror::Error;

/// Comprehensive error type for all sidecar operations.
#[derive(Error, Debug)]
pub enum SidecarError {
    /// Configuration errors rejected before any side effect
    #[error("configuration error: {message}")]
    Configuration { message: String },
    /// Config document parse or shape errors
    #[error("config document '{path}': {message}")]
    Document { path: PathBuf, message: String },
    /// File system operation errors
    #[error("file system error at '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Serialization/deserialization errors
    #[error("serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
    /// Container runtime failures (listing, stop/start/restart, events)
    #[error("container runtime: {operation}: {message}")]
    Runtime { operation: String, message: String },
    /// A single container's plan could not be built; callers skip, not abort
    #[error("container {container}: {reason}")]
    PlanBuild { container: String, reason: String },
    /// An external command exited non-zero or could not be spawned
    #[error("command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },
    /// The shared cancellation token fired mid-operation
    #[error("operation canceled")]
    Canceled,
}

impl SidecarError {
    /// Creates a configuration error from any displayable message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a runtime error tagged with the failing operation.
    pub fn runtime(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a per-container build failure.
    pub fn plan_build(container: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PlanBuild {
            container: container.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for sidecar operations
pub type Result<T> = std::result::Result<T, SidecarError>;
