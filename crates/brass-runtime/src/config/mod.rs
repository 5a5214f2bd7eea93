//! Configuration for the Brass runtime.
//!
//! Settings are layered with figment (defaults, files, `BRASS_*` environment
//! variables, programmatic merges) and validated before use.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    BrassConfig, DispatchConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
