//! Sieves: per-handler event filters.
//!
//! Every (event, handler) pair passes through all registered sieves in
//! registration order before it is scheduled. A sieve may pass the event on
//! unchanged, hand back a modified event, or drop it. A sieve that returns an
//! error or panics also drops the event; the failure is logged with the
//! identities of both the sieve and the target handler.
//!
//! [`SieveCheck`] exposes the pipeline as a tower [`Predicate`], so a drop
//! surfaces as an [`EventSkipped`] error.
//!
//! # Example
//!
//! ```rust,ignore
//! let ignore_bots = Sieve::new("core", "ignore_bots", |event, _handler| {
//!     if event.nick.ends_with("bot") { Ok(None) } else { Ok(Some(event)) }
//! });
//! registry.add_sieve(ignore_bots);
//! ```

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use brass_core::ParsedEvent;
use tower::BoxError;
use tower::filter::Predicate;
use tracing::error;

use crate::error::{DispatchError, EventSkipped};
use crate::handler::{HandlerDescriptor, HandlerId};

/// What a sieve returns: the (possibly modified) event, `None` to drop, or a failure.
pub type SieveOutput = Result<Option<ParsedEvent>, BoxError>;

/// Type-erased sieve function.
pub type SieveFn = Arc<dyn Fn(ParsedEvent, &HandlerDescriptor) -> SieveOutput + Send + Sync>;

/// A registered sieve.
#[derive(Clone)]
pub struct Sieve {
    id: HandlerId,
    func: SieveFn,
}

impl Sieve {
    /// Creates a sieve owned by `plugin` named `function`.
    pub fn new<F>(plugin: impl Into<String>, function: impl Into<String>, f: F) -> Self
    where
        F: Fn(ParsedEvent, &HandlerDescriptor) -> SieveOutput + Send + Sync + 'static,
    {
        Self {
            id: HandlerId::new(plugin, function),
            func: Arc::new(f),
        }
    }

    /// Sieve identity.
    pub fn id(&self) -> &HandlerId {
        &self.id
    }

    fn apply(&self, event: ParsedEvent, handler: &HandlerDescriptor) -> Result<Option<ParsedEvent>, DispatchError> {
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.func)(event, handler)));
        let reason = match outcome {
            Ok(Ok(passed)) => return Ok(passed),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };
        Err(DispatchError::SieveFailure {
            sieve: self.id.to_string(),
            handler: handler.id().to_string(),
            reason,
        })
    }
}

impl std::fmt::Debug for Sieve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Sieve").field(&self.id).finish()
    }
}

// =============================================================================
// SievePipeline
// =============================================================================

/// The ordered list of sieves applied to every (event, handler) pair.
#[derive(Debug, Clone, Default)]
pub struct SievePipeline {
    sieves: Arc<[Sieve]>,
}

impl SievePipeline {
    /// Creates a pipeline running `sieves` in order.
    pub fn new(sieves: impl Into<Arc<[Sieve]>>) -> Self {
        Self {
            sieves: sieves.into(),
        }
    }

    /// Number of sieves.
    pub fn len(&self) -> usize {
        self.sieves.len()
    }

    /// Returns `true` if no sieves are registered.
    pub fn is_empty(&self) -> bool {
        self.sieves.is_empty()
    }

    /// Runs every sieve; returns the surviving event or `None` on the first drop.
    pub fn run(&self, mut event: ParsedEvent, handler: &HandlerDescriptor) -> Option<ParsedEvent> {
        for sieve in self.sieves.iter() {
            match sieve.apply(event, handler) {
                Ok(Some(passed)) => event = passed,
                Ok(None) => return None,
                Err(e) => {
                    error!(sieve = %sieve.id(), handler = %handler.id(), error = %e, "Sieve failed");
                    return None;
                }
            }
        }
        Some(event)
    }
}

/// The sieve pipeline bound to one target handler, as a tower predicate.
#[derive(Clone)]
pub struct SieveCheck {
    pipeline: SievePipeline,
    handler: Arc<HandlerDescriptor>,
}

impl SieveCheck {
    /// Binds `pipeline` to `handler`.
    pub fn new(pipeline: SievePipeline, handler: Arc<HandlerDescriptor>) -> Self {
        Self { pipeline, handler }
    }
}

impl Predicate<ParsedEvent> for SieveCheck {
    type Request = ParsedEvent;

    fn check(&mut self, event: ParsedEvent) -> Result<ParsedEvent, BoxError> {
        self.pipeline
            .run(event, &self.handler)
            .ok_or_else(|| Box::new(EventSkipped) as BoxError)
    }
}

/// Renders a panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
