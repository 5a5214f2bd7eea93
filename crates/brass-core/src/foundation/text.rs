//! Routing-specific payloads carried in [`ParsedEvent::text`](crate::ParsedEvent).

use std::collections::HashMap;
use std::ops::Range;

use regex::{Captures, Regex};

/// Owned snapshot of a regex match against a trailing message.
///
/// Captures borrow the haystack, so the router copies out everything a
/// handler may need before the event crosses a task boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    matched: String,
    range: Range<usize>,
    groups: Vec<Option<String>>,
    named: HashMap<String, String>,
}

impl PatternMatch {
    /// Copies a set of captures produced by `regex`.
    pub fn from_captures(regex: &Regex, caps: &Captures<'_>) -> Self {
        let whole = caps.get(0);
        let groups = caps
            .iter()
            .skip(1)
            .map(|g| g.map(|m| m.as_str().to_string()))
            .collect();
        let named = regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();

        Self {
            matched: whole.map(|m| m.as_str().to_string()).unwrap_or_default(),
            range: whole.map(|m| m.range()).unwrap_or(0..0),
            groups,
            named,
        }
    }

    /// Searches `haystack` and snapshots the first match, if any.
    pub fn search(regex: &Regex, haystack: &str) -> Option<Self> {
        regex
            .captures(haystack)
            .map(|caps| Self::from_captures(regex, &caps))
    }

    /// The full matched text.
    pub fn as_str(&self) -> &str {
        &self.matched
    }

    /// Byte range of the match within the searched text.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Positional group `index` (1-based, like regex groups).
    pub fn group(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return Some(&self.matched);
        }
        self.groups.get(index - 1)?.as_deref()
    }

    /// Named group `name`.
    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// Number of positional groups, excluding the whole match.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// The `text` field of an event, which depends on how it was routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventText {
    /// Default: the raw parameter list.
    Params(Vec<String>),
    /// Command dispatch: the text after the trigger, trimmed.
    Command(String),
    /// Pattern dispatch: the match result.
    Match(PatternMatch),
}

impl EventText {
    /// Returns `true` when there is no user-supplied text.
    ///
    /// A match is never empty, even if it matched the empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Params(params) => params.is_empty(),
            Self::Command(text) => text.is_empty(),
            Self::Match(_) => false,
        }
    }

    /// Returns the command text, if this came from command dispatch.
    pub fn as_command(&self) -> Option<&str> {
        match self {
            Self::Command(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the match, if this came from pattern dispatch.
    pub fn as_match(&self) -> Option<&PatternMatch> {
        match self {
            Self::Match(m) => Some(m),
            _ => None,
        }
    }
}
