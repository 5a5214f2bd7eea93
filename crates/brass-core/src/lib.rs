//! # Brass Core
//!
//! The foundation of the Brass dispatch engine.
//!
//! This crate holds the types every other layer agrees on:
//!
//! ## Foundation Layer
//!
//! - **Lines**: the structured line a connection produces ([`RawLine`])
//! - **Events**: a line plus routing-derived fields ([`ParsedEvent`])
//! - **Payloads**: command text or pattern matches ([`EventText`], [`PatternMatch`])
//!
//! ## Integration Layer
//!
//! - **Connection**: how replies leave the engine ([`Connection`])
//! - **Store**: per-call persistent sessions ([`StoreProvider`], [`StoreSession`])
//!
//! ## Data Flow
//!
//! ```text
//! ┌────────────┐  RawLine  ┌────────────┐  ParsedEvent  ┌───────────┐
//! │ Connection │──────────▶│ Dispatcher │──────────────▶│  Handler  │
//! └────────────┘           └────────────┘──────────────▶│  Handler  │
//!       ▲                                               └───────────┘
//!       └───────────────────── reply ─────────────────────────┘
//! ```

pub mod error;
pub mod foundation;
pub mod integration;

pub use error::{
    ConnectionError, ConnectionResult, LineParseError, StoreError, StoreResult,
};
pub use foundation::{EventText, ParsedEvent, PatternMatch, RawLine, format_reply};
pub use integration::{
    BoxedConnection, BoxedStoreProvider, BoxedStoreSession, Connection, ConnectionConfig,
    StoreProvider, StoreSession, downcast_session,
};
