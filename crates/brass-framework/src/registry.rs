//! Handler and sieve tables.
//!
//! [`HandlerRegistry`] is filled once by the plugin loader and then shared,
//! read-only, with the [`Dispatcher`](crate::Dispatcher). It keeps:
//!
//! - a command table (unique lowercase names),
//! - an event table (uppercase verb to handlers, in registration order),
//! - the catch-all list,
//! - the pattern list, in registration order,
//! - the sieve list, in registration order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::handler::{HandlerDescriptor, HandlerKind};
use crate::sieve::{Sieve, SievePipeline};

/// Routing tables for every registered handler and sieve.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    commands: HashMap<String, Arc<HandlerDescriptor>>,
    events: HashMap<String, Vec<Arc<HandlerDescriptor>>>,
    catch_all: Vec<Arc<HandlerDescriptor>>,
    patterns: Vec<Arc<HandlerDescriptor>>,
    sieves: Vec<Sieve>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler according to its kind.
    ///
    /// Fails without modifying the registry if any of a command handler's
    /// names is already taken.
    pub fn register(&mut self, handler: HandlerDescriptor) -> RegistryResult<Arc<HandlerDescriptor>> {
        let handler = Arc::new(handler);

        match handler.kind() {
            HandlerKind::Command { names } => {
                if let Some((name, existing)) = names
                    .iter()
                    .find_map(|n| self.commands.get(n).map(|h| (n, h)))
                {
                    return Err(RegistryError::DuplicateCommand {
                        name: name.clone(),
                        existing: existing.id().to_string(),
                        new: handler.id().to_string(),
                    });
                }
                // Names are distinct per handler; see `HandlerBuilder::command`.
                for name in names {
                    self.commands.insert(name.clone(), handler.clone());
                }
            }
            HandlerKind::Event { verbs } => {
                for verb in verbs {
                    self.events.entry(verb.clone()).or_default().push(handler.clone());
                }
            }
            HandlerKind::CatchAll => self.catch_all.push(handler.clone()),
            HandlerKind::Pattern { .. } => self.patterns.push(handler.clone()),
        }

        debug!(handler = %handler.id(), kind = ?handler.kind(), "Registered handler");
        Ok(handler)
    }

    /// Appends a sieve to the pipeline.
    pub fn add_sieve(&mut self, sieve: Sieve) {
        debug!(sieve = %sieve.id(), "Registered sieve");
        self.sieves.push(sieve);
    }

    /// Looks up a command handler by lowercase name.
    pub fn command(&self, name: &str) -> Option<&Arc<HandlerDescriptor>> {
        self.commands.get(name)
    }

    /// Handlers registered for `verb`.
    pub fn events_for(&self, verb: &str) -> &[Arc<HandlerDescriptor>] {
        self.events.get(verb).map(Vec::as_slice).unwrap_or_default()
    }

    /// Catch-all handlers.
    pub fn catch_all(&self) -> &[Arc<HandlerDescriptor>] {
        &self.catch_all
    }

    /// Pattern handlers, in registration order.
    pub fn patterns(&self) -> &[Arc<HandlerDescriptor>] {
        &self.patterns
    }

    /// Registered sieves, in registration order.
    pub fn sieves(&self) -> &[Sieve] {
        &self.sieves
    }

    /// Builds the sieve pipeline.
    pub fn sieve_pipeline(&self) -> SievePipeline {
        SievePipeline::new(self.sieves.clone())
    }

    /// Number of registered command names.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}
