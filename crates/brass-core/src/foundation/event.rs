//! The event type handed to sieves and handlers.
//!
//! A [`ParsedEvent`] is a snapshot of one [`RawLine`] together with the
//! fields derived for routing: the resolved reply target (`chan`), the
//! `text` payload and the command `trigger`. The router builds a fresh event
//! for every handler it selects, so per-handler fields never leak between
//! dispatch paths.
//!
//! # Target resolution
//!
//! If the first parameter equals the connection's own nickname (compared
//! case-insensitively) the line was a direct message and `chan` is the
//! sender's nick. Otherwise `chan` is the lowercased first parameter.
//!
//! ```rust,ignore
//! let line: RawLine = ":alice!u@h PRIVMSG bot :hello".parse()?;
//! let event = ParsedEvent::new(conn, line); // conn.nick() == "bot"
//! assert_eq!(event.chan, "alice");
//! ```

use std::fmt;

use tracing::debug;

use crate::error::ConnectionResult;
use crate::foundation::line::RawLine;
use crate::foundation::text::{EventText, PatternMatch};
use crate::integration::connection::BoxedConnection;

/// One parsed protocol line plus routing-derived fields.
#[derive(Clone)]
pub struct ParsedEvent {
    conn: BoxedConnection,
    /// The line as received.
    pub raw: String,
    /// Origin prefix.
    pub prefix: String,
    /// Command verb.
    pub command: String,
    /// Unparsed parameter string.
    pub params: String,
    /// Sender nickname.
    pub nick: String,
    /// Sender username.
    pub user: String,
    /// Sender hostname.
    pub host: String,
    /// Sender mask, `nick!user@host`.
    pub mask: String,
    /// Parameter list; the last element is the trailing message.
    pub paraml: Vec<String>,
    /// The trailing message.
    pub msg: String,
    /// Identifier of the server the line came from.
    pub server: String,
    /// Last parameter; same as `msg`.
    pub lastparam: String,
    /// Resolved reply target: a lowercased channel, or the sender's nick.
    pub chan: String,
    /// Routing payload.
    pub text: EventText,
    /// Untrimmed text after the trigger; only set for command dispatch.
    pub text_unstripped: Option<String>,
    /// The command name that triggered this dispatch.
    pub trigger: Option<String>,
}

impl ParsedEvent {
    /// Builds an event from a parsed line received on `conn`.
    pub fn new(conn: BoxedConnection, line: RawLine) -> Self {
        let own_nick = conn.nick();
        let chan = match line.paraml.first() {
            Some(first) if first.eq_ignore_ascii_case(&own_nick) => line.nick.clone(),
            Some(first) => first.to_lowercase(),
            None => String::new(),
        };
        let server = conn.server().to_string();

        Self {
            raw: line.raw,
            prefix: line.prefix,
            command: line.command,
            params: line.params,
            nick: line.nick,
            user: line.user,
            host: line.host,
            mask: line.mask,
            lastparam: line.msg.clone(),
            text: EventText::Params(line.paraml.clone()),
            paraml: line.paraml,
            msg: line.msg,
            server,
            chan,
            conn,
            text_unstripped: None,
            trigger: None,
        }
    }

    /// Marks this event as a command dispatch for `trigger`.
    pub fn with_command(mut self, trigger: impl Into<String>, unstripped: impl Into<String>) -> Self {
        let unstripped = unstripped.into();
        self.trigger = Some(trigger.into());
        self.text = EventText::Command(unstripped.trim().to_string());
        self.text_unstripped = Some(unstripped);
        self
    }

    /// Marks this event as a pattern dispatch carrying `m`.
    pub fn with_match(mut self, m: PatternMatch) -> Self {
        self.text = EventText::Match(m);
        self
    }

    /// The connection this event arrived on.
    pub fn connection(&self) -> &BoxedConnection {
        &self.conn
    }

    /// Returns `true` if the line was addressed directly to us.
    pub fn is_private(&self) -> bool {
        self.chan == self.nick
    }

    /// Sends `message` to `target`, or to the current channel/user.
    pub async fn message(&self, message: &str, target: Option<&str>) -> ConnectionResult<()> {
        let target = target.unwrap_or(&self.chan);
        self.conn.send_message(target, message).await
    }

    /// Sends `message` to `target` (default: the current channel/user),
    /// prefixed with the sender's nick unless replying to the sender.
    pub async fn reply(&self, message: &str, target: Option<&str>) -> ConnectionResult<()> {
        let target = target.unwrap_or(&self.chan);
        let text = format_reply(&self.nick, target, message);
        debug!(target = %target, "Sending reply");
        self.conn.send_message(target, &text).await
    }

    /// Sends a CTCP ACTION to `target`, or to the current channel/user.
    pub async fn action(&self, message: &str, target: Option<&str>) -> ConnectionResult<()> {
        let target = target.unwrap_or(&self.chan);
        self.conn.send_ctcp(target, "ACTION", message).await
    }

    /// Sends a CTCP of `ctcp_type` to `target`, or to the current channel/user.
    pub async fn ctcp(
        &self,
        message: &str,
        ctcp_type: &str,
        target: Option<&str>,
    ) -> ConnectionResult<()> {
        let target = target.unwrap_or(&self.chan);
        self.conn.send_ctcp(target, ctcp_type, message).await
    }

    /// Sends a NOTICE to `target`, or to the sender.
    pub async fn notice(&self, message: &str, target: Option<&str>) -> ConnectionResult<()> {
        let target = target.unwrap_or(&self.nick);
        self.conn
            .send_raw("NOTICE", &[target.to_string(), message.to_string()])
            .await
    }

    /// Returns whether the sender holds `permission`.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.conn.has_permission(&self.mask, permission)
    }
}

/// Formats a reply: plain when talking to the sender, `(<nick>) <text>` otherwise.
pub fn format_reply(sender: &str, target: &str, message: &str) -> String {
    if target == sender {
        message.to_string()
    } else {
        format!("({sender}) {message}")
    }
}

impl fmt::Debug for ParsedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedEvent")
            .field("command", &self.command)
            .field("mask", &self.mask)
            .field("chan", &self.chan)
            .field("paraml", &self.paraml)
            .field("text", &self.text)
            .field("trigger", &self.trigger)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}
