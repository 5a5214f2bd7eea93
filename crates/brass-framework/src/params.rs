//! Parameter resolution.
//!
//! Handlers declare their inputs by name. Each name is resolved once, at
//! build time, into a [`Binding`]:
//!
//! 1. The alias table rewrites legacy names (`inp` and `match` become `text`,
//!    `paramlist` becomes `paraml`).
//! 2. The reserved name `db` binds to the per-call store session.
//! 3. Any other name is looked up in the field accessor table.
//!
//! At dispatch time [`resolve`] turns bindings into a [`Params`] list for one
//! event. A name bound to nothing, or a field the event does not carry,
//! aborts the dispatch.
//!
//! | name | value |
//! |------|-------|
//! | `raw`, `prefix`, `command`, `params`, `nick`, `user`, `host`, `mask`, `msg`, `lastparam`, `chan`, `server` | [`ParamValue::Str`] |
//! | `paraml` | [`ParamValue::List`] |
//! | `text` | [`ParamValue::Text`] |
//! | `text_unstripped` | [`ParamValue::Str`], command dispatch only |
//! | `trigger` | [`ParamValue::OptStr`] |
//! | `input` | [`ParamValue::Event`] |
//! | `conn` | [`ParamValue::Conn`] |
//! | `db` | [`ParamValue::Store`] |

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use brass_core::{BoxedConnection, BoxedStoreSession, EventText, ParsedEvent};

use crate::error::{DispatchError, DispatchResult};
use crate::handler::HandlerDescriptor;

/// Name of the reserved store-session input.
pub const STORE_INPUT: &str = "db";

/// Legacy input names and the canonical field they stand for.
pub const ALIASES: &[(&str, &str)] = &[("inp", "text"), ("match", "text"), ("paramlist", "paraml")];

/// Reads one field out of an event; `None` when the event lacks it.
pub type Accessor = fn(&Arc<ParsedEvent>) -> Option<ParamValue>;

static FIELDS: LazyLock<HashMap<&'static str, Accessor>> = LazyLock::new(|| {
    let table: [(&'static str, Accessor); 18] = [
        ("raw", |e| Some(ParamValue::Str(e.raw.clone()))),
        ("prefix", |e| Some(ParamValue::Str(e.prefix.clone()))),
        ("command", |e| Some(ParamValue::Str(e.command.clone()))),
        ("params", |e| Some(ParamValue::Str(e.params.clone()))),
        ("nick", |e| Some(ParamValue::Str(e.nick.clone()))),
        ("user", |e| Some(ParamValue::Str(e.user.clone()))),
        ("host", |e| Some(ParamValue::Str(e.host.clone()))),
        ("mask", |e| Some(ParamValue::Str(e.mask.clone()))),
        ("paraml", |e| Some(ParamValue::List(e.paraml.clone()))),
        ("msg", |e| Some(ParamValue::Str(e.msg.clone()))),
        ("lastparam", |e| Some(ParamValue::Str(e.lastparam.clone()))),
        ("chan", |e| Some(ParamValue::Str(e.chan.clone()))),
        ("server", |e| Some(ParamValue::Str(e.server.clone()))),
        ("text", |e| Some(ParamValue::Text(e.text.clone()))),
        ("text_unstripped", |e| e.text_unstripped.clone().map(ParamValue::Str)),
        ("trigger", |e| Some(ParamValue::OptStr(e.trigger.clone()))),
        ("input", |e| Some(ParamValue::Event(Arc::clone(e)))),
        ("conn", |e| Some(ParamValue::Conn(Arc::clone(e.connection())))),
    ];
    table.into_iter().collect()
});

// =============================================================================
// Binding
// =============================================================================

/// How a declared input is satisfied.
#[derive(Clone)]
pub enum Binding {
    /// Read from the event.
    Field {
        /// Canonical field name after alias rewriting.
        canonical: &'static str,
        /// Field reader.
        accessor: Accessor,
    },
    /// The per-call store session.
    Store,
    /// Nothing provides this name.
    Unresolved,
}

impl Binding {
    /// Computes the binding for a declared input name.
    pub fn for_input(name: &str) -> Self {
        let canonical = ALIASES
            .iter()
            .find_map(|(alias, target)| (*alias == name).then_some(*target))
            .unwrap_or(name);

        if canonical == STORE_INPUT {
            return Self::Store;
        }
        match FIELDS.get_key_value(canonical) {
            Some((key, accessor)) => Self::Field {
                canonical: *key,
                accessor: *accessor,
            },
            None => Self::Unresolved,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { canonical, .. } => write!(f, "Field({canonical})"),
            Self::Store => f.write_str("Store"),
            Self::Unresolved => f.write_str("Unresolved"),
        }
    }
}

// =============================================================================
// ParamValue & Params
// =============================================================================

/// A resolved input value.
#[derive(Clone)]
pub enum ParamValue {
    /// A text field.
    Str(String),
    /// A text field that may be absent.
    OptStr(Option<String>),
    /// The parameter list.
    List(Vec<String>),
    /// The routing payload.
    Text(EventText),
    /// The whole event.
    Event(Arc<ParsedEvent>),
    /// The originating connection.
    Conn(BoxedConnection),
    /// The per-call store session.
    Store(BoxedStoreSession),
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::OptStr(s) => write!(f, "{s:?}"),
            Self::List(l) => write!(f, "{l:?}"),
            Self::Text(t) => write!(f, "{t:?}"),
            Self::Event(e) => write!(f, "<event {}>", e.command),
            Self::Conn(c) => write!(f, "<connection {}>", c.server()),
            Self::Store(_) => f.write_str("<store session>"),
        }
    }
}

/// Resolved inputs for one call, in declaration order.
#[derive(Clone, Default)]
pub struct Params {
    values: Vec<(String, ParamValue)>,
}

impl Params {
    /// Looks up a value by its declared name.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// A text value by declared name.
    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ParamValue::Str(s) => Some(s),
            ParamValue::OptStr(s) => s.as_deref(),
            _ => None,
        }
    }

    /// A list value by declared name.
    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.get(name)? {
            ParamValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// A routing payload by declared name.
    pub fn text(&self, name: &str) -> Option<&EventText> {
        match self.get(name)? {
            ParamValue::Text(t) => Some(t),
            _ => None,
        }
    }

    /// The whole event, if declared as `input`.
    pub fn event(&self, name: &str) -> Option<&Arc<ParsedEvent>> {
        match self.get(name)? {
            ParamValue::Event(e) => Some(e),
            _ => None,
        }
    }

    /// The connection, if declared as `conn`.
    pub fn conn(&self, name: &str) -> Option<&BoxedConnection> {
        match self.get(name)? {
            ParamValue::Conn(c) => Some(c),
            _ => None,
        }
    }

    /// The store session, if declared as `db`.
    pub fn store(&self, name: &str) -> Option<&BoxedStoreSession> {
        match self.get(name)? {
            ParamValue::Store(s) => Some(s),
            _ => None,
        }
    }

    /// Values in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of resolved inputs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the handler declared no inputs.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolves `handler`'s declared inputs against `event`.
///
/// `store` must be `Some` whenever the handler [needs a store](HandlerDescriptor::needs_store).
pub fn resolve(
    handler: &HandlerDescriptor,
    event: &Arc<ParsedEvent>,
    store: Option<&BoxedStoreSession>,
) -> DispatchResult<Params> {
    let mut values = Vec::with_capacity(handler.inputs().len());

    for (name, binding) in handler.inputs().iter().zip(handler.bindings()) {
        let value = match binding {
            Binding::Field { accessor, .. } => accessor(event).ok_or_else(|| {
                DispatchError::unresolved(handler.id(), name, "field not present on this event")
            })?,
            Binding::Store => store.cloned().map(ParamValue::Store).ok_or_else(|| {
                DispatchError::unresolved(handler.id(), name, "no store configured")
            })?,
            Binding::Unresolved => {
                return Err(DispatchError::unresolved(handler.id(), name, "unknown input"));
            }
        };
        values.push((name.clone(), value));
    }

    Ok(Params { values })
}
