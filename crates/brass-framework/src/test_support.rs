//! Shared fixtures for in-crate tests.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use brass_core::{
    BoxedStoreSession, Connection, ConnectionConfig, ConnectionResult, ParsedEvent, StoreError,
    StoreProvider, StoreResult, StoreSession,
};

/// One line written through [`MockConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message { target: String, text: String },
    Ctcp { target: String, kind: String, text: String },
    Raw { command: String, params: Vec<String> },
}

pub struct MockConnection {
    nick: String,
    config: ConnectionConfig,
    sent: Mutex<Vec<Sent>>,
}

impl MockConnection {
    pub fn new(nick: &str) -> Arc<Self> {
        Self::with_prefix(nick, ".")
    }

    pub fn with_prefix(nick: &str, prefix: &str) -> Arc<Self> {
        Arc::new(Self {
            nick: nick.to_string(),
            config: ConnectionConfig {
                command_prefix: prefix.to_string(),
            },
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Message { target, text } => Some((target, text)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn nick(&self) -> String {
        self.nick.clone()
    }

    fn server(&self) -> &str {
        "irc.test"
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn send_message(&self, target: &str, text: &str) -> ConnectionResult<()> {
        self.sent.lock().push(Sent::Message {
            target: target.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_ctcp(&self, target: &str, ctcp_type: &str, text: &str) -> ConnectionResult<()> {
        self.sent.lock().push(Sent::Ctcp {
            target: target.to_string(),
            kind: ctcp_type.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_raw(&self, command: &str, params: &[String]) -> ConnectionResult<()> {
        self.sent.lock().push(Sent::Raw {
            command: command.to_string(),
            params: params.to_vec(),
        });
        Ok(())
    }

    fn has_permission(&self, _mask: &str, _permission: &str) -> bool {
        false
    }
}

/// Builds an event for `line` received on `conn`.
pub fn event(conn: &Arc<MockConnection>, line: &str) -> ParsedEvent {
    ParsedEvent::new(conn.clone(), line.parse().expect("valid test line"))
}

/// Store that counts session opens and closes.
#[derive(Default)]
pub struct MemoryStore {
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
    pub fail_open: AtomicBool,
}

impl MemoryStore {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MemorySession {
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn close(&self) -> StoreResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl StoreProvider for MemoryStore {
    async fn open(&self) -> StoreResult<BoxedStoreSession> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(StoreError::Open("store offline".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySession {
            closed: self.closed.clone(),
        }))
    }
}
