//! Handler descriptors.
//!
//! A [`HandlerDescriptor`] is everything the engine knows about one handler
//! function: who owns it, which inputs it declares, how it is routed
//! ([`HandlerKind`]) and how it is scheduled ([`ConcurrencyMode`]).
//! Descriptors are immutable once built and shared behind `Arc`.
//!
//! # Example
//!
//! ```rust,ignore
//! use brass_framework::handler::HandlerBuilder;
//!
//! let echo = HandlerBuilder::new("misc", "echo")
//!     .command(["echo", "say"])
//!     .inputs(["inp", "nick"])
//!     .doc("echo <text> -- repeats <text>")
//!     .handler(|params| async move {
//!         let text = params.text("inp").and_then(|t| t.as_command()).unwrap_or_default();
//!         Ok(Some(text.to_string()))
//!     })
//!     .build()?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use tower::BoxError;

use crate::error::{RegistryError, RegistryResult};
use crate::params::{Binding, Params};

/// What a handler returns: optional reply text, or a failure.
pub type HandlerOutput = Result<Option<String>, BoxError>;

/// Type-erased handler function.
pub type HandlerFn = Arc<dyn Fn(Params) -> BoxFuture<'static, HandlerOutput> + Send + Sync>;

// =============================================================================
// Identity
// =============================================================================

/// Identity of a handler or sieve: owning plugin and function name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId {
    plugin: String,
    function: String,
}

impl HandlerId {
    /// Creates an identity.
    pub fn new(plugin: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            function: function.into(),
        }
    }

    /// Owning plugin name.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Function name.
    pub fn function(&self) -> &str {
        &self.function
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.plugin, self.function)
    }
}

// =============================================================================
// Kind & Mode
// =============================================================================

/// How a handler is selected for a line.
#[derive(Debug, Clone)]
pub enum HandlerKind {
    /// Fires on a `PRIVMSG` whose command token equals one of `names`.
    Command {
        /// Lowercase command names.
        names: Vec<String>,
    },
    /// Fires on lines whose verb equals one of `verbs`.
    Event {
        /// Uppercase protocol verbs.
        verbs: Vec<String>,
    },
    /// Fires on every line.
    CatchAll,
    /// Fires on a `PRIVMSG` whose trailing message contains a match.
    Pattern {
        /// Compiled pattern.
        regex: Regex,
    },
}

/// Scheduling policy for a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyMode {
    /// One dedicated worker; events handled strictly in arrival order.
    Ordered,
    /// Each event handled in its own task with no ordering guarantee.
    #[default]
    Concurrent,
}

// =============================================================================
// HandlerDescriptor
// =============================================================================

/// A registered handler.
pub struct HandlerDescriptor {
    id: HandlerId,
    inputs: Vec<String>,
    bindings: Vec<Binding>,
    doc: Option<String>,
    mode: ConcurrencyMode,
    autohelp: bool,
    kind: HandlerKind,
    func: HandlerFn,
}

impl HandlerDescriptor {
    /// Handler identity.
    pub fn id(&self) -> &HandlerId {
        &self.id
    }

    /// Declared input names, in declaration order.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Bindings computed for [`inputs`](Self::inputs), index-aligned.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Usage documentation.
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Scheduling policy.
    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    /// Whether an empty command invocation sends usage instead.
    pub fn autohelp(&self) -> bool {
        self.autohelp
    }

    /// Routing kind.
    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    /// Returns `true` for command handlers.
    pub fn is_command(&self) -> bool {
        matches!(self.kind, HandlerKind::Command { .. })
    }

    /// Returns `true` if any input is bound to the store session.
    pub fn needs_store(&self) -> bool {
        self.bindings.iter().any(|b| matches!(b, Binding::Store))
    }

    /// Calls the handler function.
    pub fn call(&self, params: Params) -> BoxFuture<'static, HandlerOutput> {
        (self.func)(params)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .field("mode", &self.mode)
            .field("autohelp", &self.autohelp)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// HandlerBuilder
// =============================================================================

enum PendingKind {
    Command(Vec<String>),
    Event(Vec<String>),
    CatchAll,
    Pattern(String),
}

/// Builder for [`HandlerDescriptor`].
pub struct HandlerBuilder {
    id: HandlerId,
    inputs: Vec<String>,
    doc: Option<String>,
    mode: ConcurrencyMode,
    autohelp: bool,
    kind: Option<PendingKind>,
    func: Option<HandlerFn>,
}

impl HandlerBuilder {
    /// Starts a handler owned by `plugin` named `function`.
    pub fn new(plugin: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            id: HandlerId::new(plugin, function),
            inputs: Vec::new(),
            doc: None,
            mode: ConcurrencyMode::default(),
            autohelp: true,
            kind: None,
            func: None,
        }
    }

    /// Routes by command name. Names are matched lowercase; repeats are ignored.
    pub fn command<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = distinct(names.into_iter().map(|n| n.as_ref().to_lowercase()));
        self.kind = Some(PendingKind::Command(names));
        self
    }

    /// Routes by protocol verb. The verb `*` makes this a catch-all handler.
    /// Verbs are matched uppercase; repeats are ignored.
    pub fn event<I, S>(mut self, verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let verbs = distinct(verbs.into_iter().map(|v| v.as_ref().to_uppercase()));
        self.kind = Some(if verbs.iter().any(|v| v == "*") {
            PendingKind::CatchAll
        } else {
            PendingKind::Event(verbs)
        });
        self
    }

    /// Fires on every line.
    pub fn catch_all(mut self) -> Self {
        self.kind = Some(PendingKind::CatchAll);
        self
    }

    /// Routes by searching the trailing message with `pattern`.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.kind = Some(PendingKind::Pattern(pattern.into()));
        self
    }

    /// Declares the inputs the handler takes, in order.
    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets usage documentation.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Handles events one at a time, in arrival order.
    pub fn ordered(mut self) -> Self {
        self.mode = ConcurrencyMode::Ordered;
        self
    }

    /// Sets the scheduling policy.
    pub fn mode(mut self, mode: ConcurrencyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables automatic usage replies. Enabled by default.
    pub fn autohelp(mut self, enabled: bool) -> Self {
        self.autohelp = enabled;
        self
    }

    /// Sets the handler function.
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutput> + Send + 'static,
    {
        self.func = Some(Arc::new(move |params| f(params).boxed()));
        self
    }

    /// Validates the builder and computes input bindings.
    pub fn build(self) -> RegistryResult<HandlerDescriptor> {
        let incomplete = |part| RegistryError::Incomplete {
            handler: self.id.to_string(),
            part,
        };
        let func = self.func.ok_or_else(|| incomplete("handler function"))?;
        let kind = match self.kind {
            Some(PendingKind::Command(names)) if !names.is_empty() => HandlerKind::Command { names },
            Some(PendingKind::Event(verbs)) if !verbs.is_empty() => HandlerKind::Event { verbs },
            Some(PendingKind::CatchAll) => HandlerKind::CatchAll,
            Some(PendingKind::Pattern(pattern)) => {
                let regex = Regex::new(&pattern).map_err(|source| RegistryError::InvalidPattern {
                    handler: self.id.to_string(),
                    source,
                })?;
                HandlerKind::Pattern { regex }
            }
            _ => return Err(incomplete("routing kind")),
        };
        let bindings = self.inputs.iter().map(|name| Binding::for_input(name)).collect();

        Ok(HandlerDescriptor {
            id: self.id,
            inputs: self.inputs,
            bindings,
            doc: self.doc,
            mode: self.mode,
            autohelp: self.autohelp,
            kind,
            func,
        })
    }
}

/// Collects `items`, keeping the first occurrence of each.
fn distinct(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}
