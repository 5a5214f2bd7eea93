//! Brass Runtime - configuration, logging and lifecycle for the Brass engine.
//!
//! This crate provides:
//! - Layered configuration loading ([`ConfigLoader`], [`BrassConfig`])
//! - Log subscriber setup ([`LoggingBuilder`], [`logging::init_from_config`])
//! - A runtime owning the [`Dispatcher`](brass_framework::Dispatcher) with
//!   signal-driven shutdown ([`BrassRuntime`])
//!
//! ```rust,ignore
//! use brass_runtime::BrassRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = BrassRuntime::builder().registry(registry).build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{BrassConfig, ConfigError, ConfigLoader, ConfigResult, DispatchConfig, LoggingConfig};
pub use error::{LoggingError, RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{BrassRuntime, RuntimeBuilder};

// Re-export tracing for use by handler crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
