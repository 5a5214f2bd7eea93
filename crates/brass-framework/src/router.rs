//! Line routing.
//!
//! The [`Router`] turns one [`RawLine`] into the list of (handler, event)
//! pairs that should see it. Candidates are produced in this order:
//!
//! 1. handlers registered for the line's verb, then every catch-all handler;
//! 2. for `PRIVMSG` only, at most one command handler;
//! 3. for `PRIVMSG` only, every pattern handler whose regex is found in the
//!    trailing message.
//!
//! Each pair carries its own [`ParsedEvent`]; command and pattern routing set
//! different `text` payloads on their copies.
//!
//! # Command syntax
//!
//! In a channel a command must start with one of the connection's prefix
//! characters, or address the bot by nick (`bot: cmd args`, `bot, cmd`).
//! In a private message the prefix is optional.

use std::collections::HashMap;
use std::sync::Arc;

use brass_core::{BoxedConnection, ParsedEvent, PatternMatch, RawLine};
use parking_lot::Mutex;
use regex::Regex;
use tracing::{error, trace};

use crate::handler::{HandlerDescriptor, HandlerKind};
use crate::registry::HandlerRegistry;

/// A handler selected for a line, with the event it will receive.
#[derive(Debug)]
pub struct Route {
    /// Selected handler.
    pub handler: Arc<HandlerDescriptor>,
    /// The event built for this handler.
    pub event: ParsedEvent,
}

struct CommandPatterns {
    channel: Regex,
    private: Regex,
}

impl CommandPatterns {
    fn compile(nick: &str, prefix: &str) -> Result<Self, regex::Error> {
        let addressed = format!(r"{}[,;:]+\s+", regex::escape(nick));
        let tail = r"(\w+)(?:$|\s+)(.*)";

        let (channel, private) = if prefix.is_empty() {
            (
                format!("^(?:{addressed}){tail}"),
                format!("^(?:{addressed})?{tail}"),
            )
        } else {
            let class = format!("[{}]", regex::escape(prefix));
            (
                format!("^(?:{class}|{addressed}){tail}"),
                format!("^(?:{class}?|{addressed}){tail}"),
            )
        };

        Ok(Self {
            channel: Regex::new(&channel)?,
            private: Regex::new(&private)?,
        })
    }
}

/// Selects handlers for incoming lines.
pub struct Router {
    registry: Arc<HandlerRegistry>,
    // Keyed by (nick, prefix); rebuilt only when either changes.
    command_patterns: Mutex<HashMap<(String, String), Arc<CommandPatterns>>>,
}

impl Router {
    /// Creates a router over `registry`.
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            command_patterns: Mutex::new(HashMap::new()),
        }
    }

    /// Routes one line received on `conn`.
    pub fn route(&self, conn: BoxedConnection, line: RawLine) -> Vec<Route> {
        let base = ParsedEvent::new(conn, line);
        let verb = base.command.to_ascii_uppercase();
        let mut routes = Vec::new();

        for handler in self
            .registry
            .events_for(&verb)
            .iter()
            .chain(self.registry.catch_all())
        {
            routes.push(Route {
                handler: handler.clone(),
                event: base.clone(),
            });
        }

        if verb == "PRIVMSG" {
            if let Some(route) = self.match_command(&base) {
                routes.push(route);
            }
            routes.extend(self.match_patterns(&base));
        }

        trace!(command = %base.command, routes = routes.len(), "Routed line");
        routes
    }

    fn match_command(&self, base: &ParsedEvent) -> Option<Route> {
        let conn = base.connection();
        let patterns = self.patterns_for(&conn.nick(), &conn.config().command_prefix)?;
        let regex = if base.is_private() {
            &patterns.private
        } else {
            &patterns.channel
        };

        let caps = regex.captures(&base.lastparam)?;
        let token = caps.get(1)?.as_str().to_lowercase();
        let rest = caps.get(2).map_or("", |m| m.as_str());
        let handler = self.registry.command(&token)?.clone();

        Some(Route {
            event: base.clone().with_command(token, rest),
            handler,
        })
    }

    fn match_patterns<'a>(&'a self, base: &'a ParsedEvent) -> impl Iterator<Item = Route> + 'a {
        self.registry.patterns().iter().filter_map(move |handler| {
            let HandlerKind::Pattern { regex } = handler.kind() else {
                return None;
            };
            let m = PatternMatch::search(regex, &base.lastparam)?;
            Some(Route {
                handler: handler.clone(),
                event: base.clone().with_match(m),
            })
        })
    }

    fn patterns_for(&self, nick: &str, prefix: &str) -> Option<Arc<CommandPatterns>> {
        let mut cache = self.command_patterns.lock();
        let key = (nick.to_string(), prefix.to_string());
        if let Some(patterns) = cache.get(&key) {
            return Some(patterns.clone());
        }
        match CommandPatterns::compile(nick, prefix) {
            Ok(patterns) => {
                let patterns = Arc::new(patterns);
                cache.insert(key, patterns.clone());
                Some(patterns)
            }
            Err(e) => {
                error!(nick, prefix, error = %e, "Failed to build command pattern");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerBuilder;
    use crate::test_support::MockConnection;
    use brass_core::EventText;

    fn builder(function: &str) -> HandlerBuilder {
        HandlerBuilder::new("test", function).handler(|_| async { Ok(None) })
    }

    fn router() -> Router {
        let mut registry = HandlerRegistry::new();
        registry.register(builder("on_privmsg").event(["PRIVMSG"]).build().unwrap()).unwrap();
        registry.register(builder("everything").catch_all().build().unwrap()).unwrap();
        registry.register(builder("echo").command(["echo"]).build().unwrap()).unwrap();
        registry
            .register(builder("url").pattern(r"https?://(?P<host>[^/\s]+)").build().unwrap())
            .unwrap();
        Router::new(Arc::new(registry))
    }

    fn route(router: &Router, conn: &Arc<MockConnection>, line: &str) -> Vec<Route> {
        router.route(conn.clone(), line.parse().unwrap())
    }

    fn names(routes: &[Route]) -> Vec<&str> {
        routes.iter().map(|r| r.handler.id().function()).collect()
    }

    #[test]
    fn test_channel_command_with_prefix() {
        let router = router();
        let conn = MockConnection::new("bot");
        let routes = route(&router, &conn, ":alice!u@h PRIVMSG #chan :.Echo   hello world ");

        assert_eq!(names(&routes), ["on_privmsg", "everything", "echo"]);
        let cmd = &routes[2].event;
        assert_eq!(cmd.trigger.as_deref(), Some("echo"));
        assert_eq!(cmd.text, EventText::Command("hello world".into()));
        assert_eq!(cmd.text_unstripped.as_deref(), Some("hello world "));
        // The verb-routed copies keep the default payload.
        assert!(matches!(routes[0].event.text, EventText::Params(_)));
    }

    #[test]
    fn test_channel_requires_prefix_or_nick() {
        let router = router();
        let conn = MockConnection::new("bot");

        let routes = route(&router, &conn, ":alice!u@h PRIVMSG #chan :echo hi");
        assert_eq!(names(&routes), ["on_privmsg", "everything"]);

        let routes = route(&router, &conn, ":alice!u@h PRIVMSG #chan :bot: echo hi");
        assert_eq!(names(&routes), ["on_privmsg", "everything", "echo"]);
        assert_eq!(routes[2].event.text, EventText::Command("hi".into()));

        // Nick addressing is case-sensitive.
        let routes = route(&router, &conn, ":alice!u@h PRIVMSG #chan :BOT: echo hi");
        assert_eq!(names(&routes), ["on_privmsg", "everything"]);
    }

    #[test]
    fn test_private_prefix_is_optional() {
        let router = router();
        let conn = MockConnection::new("bot");
        let routes = route(&router, &conn, ":alice!u@h PRIVMSG bot :echo");

        assert_eq!(names(&routes), ["on_privmsg", "everything", "echo"]);
        assert_eq!(routes[2].event.chan, "alice");
        assert!(routes[2].event.text.is_empty());
    }

    #[test]
    fn test_multi_character_prefix() {
        let router = router();
        let conn = MockConnection::with_prefix("bot", "!-");
        assert_eq!(names(&route(&router, &conn, ":a!u@h PRIVMSG #c :!echo x")).len(), 3);
        assert_eq!(names(&route(&router, &conn, ":a!u@h PRIVMSG #c :-echo x")).len(), 3);
        assert_eq!(names(&route(&router, &conn, ":a!u@h PRIVMSG #c :.echo x")).len(), 2);
    }

    #[test]
    fn test_unknown_command_and_non_privmsg() {
        let router = router();
        let conn = MockConnection::new("bot");
        assert_eq!(
            names(&route(&router, &conn, ":alice!u@h PRIVMSG #chan :.nope")),
            ["on_privmsg", "everything"]
        );
        assert_eq!(
            names(&route(&router, &conn, ":alice!u@h NOTICE #chan :.echo http://x.org")),
            ["everything"]
        );
    }

    #[test]
    fn test_command_and_pattern_both_fire() {
        let router = router();
        let conn = MockConnection::new("bot");
        let routes = route(&router, &conn, ":alice!u@h PRIVMSG #chan :.echo see https://example.org/page");

        assert_eq!(names(&routes), ["on_privmsg", "everything", "echo", "url"]);
        let m = routes[3].event.text.as_match().unwrap();
        assert_eq!(m.as_str(), "https://example.org");
        assert_eq!(m.name("host"), Some("example.org"));
    }

    #[test]
    fn test_overlapping_patterns_route_independently() {
        let mut registry = HandlerRegistry::new();
        registry.register(builder("number").pattern(r"\d+").build().unwrap()).unwrap();
        registry.register(builder("four").pattern("4").build().unwrap()).unwrap();
        let router = Router::new(Arc::new(registry));
        let conn = MockConnection::new("bot");

        let routes = route(&router, &conn, ":alice!u@h PRIVMSG #chan :room 42");
        assert_eq!(names(&routes), ["number", "four"]);

        let number = routes[0].event.text.as_match().unwrap();
        let four = routes[1].event.text.as_match().unwrap();
        assert_eq!((number.as_str(), number.range()), ("42", 5..7));
        assert_eq!((four.as_str(), four.range()), ("4", 5..6));
    }
}
