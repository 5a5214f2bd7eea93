//! # Brass Framework
//!
//! The dispatch engine: everything between a parsed line arriving and a
//! handler function running.
//!
//! This layer provides:
//! - Handler descriptors and their builder ([`HandlerBuilder`])
//! - Name-based parameter resolution ([`params`])
//! - The sieve pipeline ([`Sieve`], [`SievePipeline`])
//! - Command, pattern and event routing ([`Router`])
//! - Ordered and concurrent scheduling ([`OrderedWorker`], [`Dispatcher`])
//! - Start/stop control ([`Lifecycle`])
//!
//! ## Flow
//!
//! ```text
//!              ┌────────┐   ┌────────┐   ┌──────────┐   ┌───────────────┐
//! RawLine ────►│ Router │──►│ Sieves │──►│ Autohelp │──►│ OrderedWorker │──► InvokeService
//!              └────────┘   └────────┘   └──────────┘   │   or task     │
//!                                                       └───────────────┘
//! ```

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod invoke;
pub mod lifecycle;
pub mod params;
pub mod registry;
pub mod router;
pub mod sieve;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use dispatcher::{DEFAULT_MAX_CONCURRENT_HANDLERS, Dispatcher, DispatcherBuilder};
pub use error::{DispatchError, DispatchResult, EventSkipped, RegistryError, RegistryResult};
pub use handler::{
    ConcurrencyMode, HandlerBuilder, HandlerDescriptor, HandlerFn, HandlerId, HandlerKind,
    HandlerOutput,
};
pub use invoke::{Invocation, InvokeService};
pub use lifecycle::Lifecycle;
pub use params::{Binding, ParamValue, Params};
pub use registry::HandlerRegistry;
pub use router::{Route, Router};
pub use sieve::{Sieve, SieveCheck, SieveFn, SieveOutput, SievePipeline};
pub use worker::{OrderedWorker, WorkerMessage, WorkerRegistry, WorkerState};

/// Boxed error type handlers and sieves fail with.
pub use tower::BoxError;
