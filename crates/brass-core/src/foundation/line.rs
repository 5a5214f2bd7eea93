//! Structured representation of one protocol line.
//!
//! A [`RawLine`] is what a connection hands to the dispatcher: the line as
//! received plus its prefix, verb and parameters already split apart. The
//! lenient [`FromStr`] implementation covers the common
//! `[:prefix] COMMAND params [:trailing]` shape and is what connections
//! without their own parser use.

use std::str::FromStr;

use crate::error::LineParseError;

/// One parsed protocol line, before any routing-specific derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawLine {
    /// The line as received, without the line terminator.
    pub raw: String,
    /// Origin prefix without the leading `:` (empty if absent).
    pub prefix: String,
    /// Command verb or numeric, e.g. `PRIVMSG` or `001`.
    pub command: String,
    /// Everything after the verb, unparsed.
    pub params: String,
    /// Sender nickname (or server name for server-originated lines).
    pub nick: String,
    /// Sender username.
    pub user: String,
    /// Sender hostname.
    pub host: String,
    /// `nick!user@host`.
    pub mask: String,
    /// Parameter list; the last element is the trailing message.
    pub paraml: Vec<String>,
    /// The trailing message (last parameter, or empty).
    pub msg: String,
}

impl RawLine {
    /// Builds a line from already-split parts, deriving the sender fields
    /// and trailing message.
    pub fn from_parts(
        raw: impl Into<String>,
        prefix: impl Into<String>,
        command: impl Into<String>,
        params: impl Into<String>,
        paraml: Vec<String>,
    ) -> Self {
        let prefix = prefix.into();
        let (nick, user, host) = split_netmask(&prefix);
        let mask = format!("{nick}!{user}@{host}");
        let msg = paraml.last().cloned().unwrap_or_default();

        Self {
            raw: raw.into(),
            prefix,
            command: command.into(),
            params: params.into(),
            nick,
            user,
            host,
            mask,
            paraml,
            msg,
        }
    }
}

impl FromStr for RawLine {
    type Err = LineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(LineParseError::Empty);
        }

        let (prefix, rest) = match line.strip_prefix(':') {
            Some(stripped) => match stripped.split_once(' ') {
                Some((prefix, rest)) => (prefix, rest.trim_start_matches(' ')),
                None => {
                    return Err(LineParseError::MissingCommand {
                        line: line.to_string(),
                    });
                }
            },
            None => ("", line),
        };

        let (command, params) = match rest.split_once(' ') {
            Some((command, params)) => (command, params),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(LineParseError::MissingCommand {
                line: line.to_string(),
            });
        }

        Ok(Self::from_parts(
            line,
            prefix,
            command,
            params,
            split_params(params),
        ))
    }
}

/// Splits a parameter string into its middle parameters and the trailing one.
fn split_params(params: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = params;

    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            out.push(trailing.to_string());
            break;
        }
        match rest.split_once(' ') {
            Some((param, tail)) => {
                out.push(param.to_string());
                rest = tail;
            }
            None => {
                out.push(rest.to_string());
                break;
            }
        }
    }

    out
}

/// Splits `nick!user@host` leniently; missing parts come back empty.
fn split_netmask(prefix: &str) -> (String, String, String) {
    let (nick_user, host) = match prefix.split_once('@') {
        Some((nick_user, host)) => (nick_user, host),
        None => (prefix, ""),
    };
    let (nick, user) = match nick_user.split_once('!') {
        Some((nick, user)) => (nick, user),
        None => (nick_user, ""),
    };
    (nick.to_string(), user.to_string(), host.to_string())
}
