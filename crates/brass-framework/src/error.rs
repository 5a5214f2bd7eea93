//! Error types for the Brass framework.

use brass_core::StoreError;
use thiserror::Error;

/// Returned by the sieve predicate when an event is dropped.
///
/// The dispatcher recognises this error and abandons the (event, handler)
/// pair without logging anything further. Sieve failures have already been
/// logged by the time this is produced.
#[derive(Debug, Clone, Error)]
#[error("event skipped by sieve")]
pub struct EventSkipped;

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Failures that end the processing of one (event, handler) pair.
///
/// None of these is fatal to the engine and none produces a reply.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A sieve returned an error or panicked.
    #[error("error running sieve {sieve} on {handler}: {reason}")]
    SieveFailure {
        /// Sieve identity.
        sieve: String,
        /// Target handler identity.
        handler: String,
        /// Failure description.
        reason: String,
    },

    /// A declared input could not be bound for this event.
    #[error("cannot resolve input '{input}' for {handler}: {reason}")]
    ParameterResolution {
        /// Handler identity.
        handler: String,
        /// The declared input name.
        input: String,
        /// Why resolution failed.
        reason: &'static str,
    },

    /// The handler returned an error or panicked.
    #[error("error in {handler}: {reason}; parameters used: {params}")]
    HandlerExecution {
        /// Handler identity.
        handler: String,
        /// Failure description.
        reason: String,
        /// Rendered parameter values the handler was called with.
        params: String,
    },

    /// The store session could not be opened or closed.
    #[error("store session for {handler}: {source}")]
    ResourceLifecycle {
        /// Handler identity.
        handler: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
}

impl DispatchError {
    /// Creates a resolution failure.
    pub fn unresolved(handler: impl ToString, input: impl Into<String>, reason: &'static str) -> Self {
        Self::ParameterResolution {
            handler: handler.to_string(),
            input: input.into(),
            reason,
        }
    }

    /// Creates a store lifecycle failure.
    pub fn store(handler: impl ToString, source: StoreError) -> Self {
        Self::ResourceLifecycle {
            handler: handler.to_string(),
            source,
        }
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors raised while building or registering handlers.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Another handler already owns the command name.
    #[error("command '{name}' of {new} is already registered by {existing}")]
    DuplicateCommand {
        /// The contested command name.
        name: String,
        /// Handler already holding the name.
        existing: String,
        /// Handler that tried to register it.
        new: String,
    },

    /// A pattern handler's regex failed to compile.
    #[error("invalid pattern for {handler}: {source}")]
    InvalidPattern {
        /// Handler identity.
        handler: String,
        /// Compilation error.
        #[source]
        source: regex::Error,
    },

    /// The builder was finished without a required part.
    #[error("handler {handler} is missing its {part}")]
    Incomplete {
        /// Handler identity.
        handler: String,
        /// What was not supplied.
        part: &'static str,
    },
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
