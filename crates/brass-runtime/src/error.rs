//! Runtime error types.

use std::path::PathBuf;

use thiserror::Error;
use tracing_subscriber::util::TryInitError;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors installing the global subscriber.
#[derive(Error, Debug)]
pub enum LoggingError {
    /// A global subscriber is already installed.
    #[error("Failed to install log subscriber: {0}")]
    Init(#[from] TryInitError),

    /// File output without a file path.
    #[error("File log output requires a file path")]
    MissingFilePath,

    /// The log file could not be opened.
    #[error("Failed to open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },
}

/// Errors that can occur while building or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    /// Handlers were still running when the shutdown timeout elapsed.
    #[error("Handlers still running after {timeout_ms}ms shutdown timeout")]
    ShutdownTimeout { timeout_ms: u64 },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
