//! Unified error types for the Brass core.
//!
//! Engine-level errors (sieve failures, resolution failures) are defined in
//! brass-framework.

use thiserror::Error;

// =============================================================================
// Line Parse Errors
// =============================================================================

/// Errors produced while turning raw text into a [`RawLine`](crate::RawLine).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineParseError {
    /// The line was empty after stripping the line terminator.
    #[error("empty line")]
    Empty,

    /// The line had a prefix but no command verb.
    #[error("missing command in line: {line}")]
    MissingCommand {
        /// The offending line.
        line: String,
    },
}

// =============================================================================
// Connection Errors
// =============================================================================

/// Errors that can occur when a handler talks back through the connection.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// The connection is not registered with the server.
    #[error("connection is not established")]
    NotConnected,

    /// Writing the outgoing line failed.
    #[error("failed to send to {target}: {reason}")]
    SendFailed {
        /// Target channel or nick.
        target: String,
        /// Reason for failure.
        reason: String,
    },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ConnectionError {
    /// Creates a send failure for `target`.
    pub fn send_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SendFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors raised while opening or closing a persistent-store session.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A session could not be opened.
    #[error("failed to open store session: {0}")]
    Open(String),

    /// A session could not be closed cleanly.
    #[error("failed to close store session: {0}")]
    Close(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
