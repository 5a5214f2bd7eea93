//! Foundation layer - event types.
//!
//! - Parsed protocol lines ([`RawLine`])
//! - Routed events ([`ParsedEvent`])
//! - Routing payloads ([`EventText`], [`PatternMatch`])

pub mod event;
pub mod line;
pub mod text;

pub use event::{ParsedEvent, format_reply};
pub use line::RawLine;
pub use text::{EventText, PatternMatch};
