//! # Brass
//!
//! Event dispatch engine for IRC-style bots.
//!
//! ## Overview
//!
//! A connection hands every parsed line to the [`Dispatcher`](framework::Dispatcher).
//! The line becomes a [`ParsedEvent`](core::ParsedEvent) and is routed three ways:
//!
//! - **Events**: handlers registered for the line's verb, plus catch-all handlers
//! - **Commands**: `.name args` or `nick: name args` in a PRIVMSG
//! - **Patterns**: regexes searched in the PRIVMSG text
//!
//! Each selected handler passes through the sieves, which may drop or rewrite
//! the event, and is then run either on its own FIFO worker (`ordered`) or as a
//! bounded background task (`concurrent`). Handlers declare the inputs they
//! want by name; a non-empty return value is sent back as a reply.
//!
//! ```text
//! ┌────────────┐   ┌────────┐   ┌────────┐   ┌─────────────────────┐
//! │ Connection │──▶│ Router │──▶│ Sieves │──▶│ OrderedWorker / task│──▶ handler ──▶ reply
//! └────────────┘   └────────┘   └────────┘   └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brass::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = HandlerRegistry::new();
//!     registry.register(
//!         HandlerBuilder::new("greet", "hello")
//!             .command(["hello", "hi"])
//!             .inputs(["nick"])
//!             .doc("<name> -- says hello")
//!             .handler(|params| async move {
//!                 Ok(Some(format!("hello, {}", params.str("nick").unwrap_or_default())))
//!             })
//!             .build()?,
//!     )?;
//!
//!     let runtime = BrassRuntime::builder().registry(registry).build()?;
//!     let dispatcher = runtime.dispatcher();
//!     // feed lines: dispatcher.dispatch_line(conn.clone(), line).await
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default): TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log lines

pub use brass_core as core;
pub use brass_framework as framework;
pub use brass_runtime as runtime;

/// Commonly used types for writing handlers and wiring a bot.
///
/// ```rust,ignore
/// use brass::prelude::*;
/// ```
pub mod prelude {
    // Runtime
    pub use brass_runtime::{BrassConfig, BrassRuntime, ConfigLoader, LoggingBuilder};

    // Registration
    pub use brass_framework::{
        BoxError, ConcurrencyMode, Dispatcher, HandlerBuilder, HandlerRegistry, Sieve,
    };

    // Handler inputs and outputs
    pub use brass_framework::{HandlerOutput, ParamValue, Params};

    // Events and collaborators
    pub use brass_core::{
        BoxedConnection, BoxedStoreProvider, BoxedStoreSession, Connection, ConnectionConfig,
        EventText, ParsedEvent, PatternMatch, RawLine, StoreProvider, StoreSession,
        downcast_session,
    };
}
