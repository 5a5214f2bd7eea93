//! Connection trait and related types.
//!
//! The connection is owned by the protocol layer; the dispatch engine only
//! reads its identity and configuration and writes replies through it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConnectionResult;

/// Per-connection settings the dispatch engine reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Characters that introduce a command in channels (e.g. `"."` or `".!"`).
    pub command_prefix: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            command_prefix: ".".to_string(),
        }
    }
}

/// The live protocol connection an event arrived on.
///
/// Implementations are provided by the protocol layer. All methods must be
/// cheap to call from many tasks at once.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The connection's current nickname.
    fn nick(&self) -> String;

    /// Identifier of the server this connection talks to.
    fn server(&self) -> &str;

    /// Configuration for this connection.
    fn config(&self) -> &ConnectionConfig;

    /// Sends a `PRIVMSG` to `target`.
    async fn send_message(&self, target: &str, text: &str) -> ConnectionResult<()>;

    /// Sends a CTCP request of `ctcp_type` to `target`.
    async fn send_ctcp(&self, target: &str, ctcp_type: &str, text: &str) -> ConnectionResult<()>;

    /// Sends an arbitrary command with the given parameters.
    async fn send_raw(&self, command: &str, params: &[String]) -> ConnectionResult<()>;

    /// Returns whether `mask` holds `permission`.
    fn has_permission(&self, mask: &str, permission: &str) -> bool;
}

/// A shared connection trait object.
pub type BoxedConnection = Arc<dyn Connection>;
