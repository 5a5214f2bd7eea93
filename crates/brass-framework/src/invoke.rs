//! Handler invocation.
//!
//! [`InvokeService`] performs one call of one handler:
//!
//! 1. open a store session if the handler declared `db`,
//! 2. resolve the declared inputs,
//! 3. call the handler, catching errors and panics,
//! 4. reply with the output if it is non-empty,
//! 5. close the store session.
//!
//! The session is closed on every path. If the invocation future is dropped
//! before it completes, the guard hands the close to the runtime.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};

use brass_core::{BoxedStoreProvider, BoxedStoreSession, ParsedEvent};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tower::Service;
use tracing::{Instrument, Level, debug, error, span, warn};

use crate::error::{DispatchError, DispatchResult};
use crate::handler::{HandlerDescriptor, HandlerId};
use crate::params::resolve;
use crate::sieve::panic_message;

/// One scheduled call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The handler to call.
    pub handler: Arc<HandlerDescriptor>,
    /// The event it receives.
    pub event: Arc<ParsedEvent>,
}

/// Calls handlers. Cheap to clone.
#[derive(Clone, Default)]
pub struct InvokeService {
    store: Option<BoxedStoreProvider>,
}

impl InvokeService {
    /// Creates a service that opens sessions from `store` when handlers ask for one.
    pub fn new(store: Option<BoxedStoreProvider>) -> Self {
        Self { store }
    }

    /// Runs one invocation to completion.
    pub async fn invoke(&self, handler: &HandlerDescriptor, event: Arc<ParsedEvent>) -> DispatchResult<()> {
        let session = match (&self.store, handler.needs_store()) {
            (Some(provider), true) => Some(SessionGuard::open(provider, handler.id()).await?),
            _ => None,
        };

        let result = call(handler, &event, session.as_ref().and_then(SessionGuard::session)).await;
        let closed = match session {
            Some(guard) => guard.close().await,
            None => Ok(()),
        };

        if let (Err(_), Err(close_err)) = (&result, &closed) {
            error!(handler = %handler.id(), error = %close_err, "Failed to close store session");
        }
        result.and(closed)
    }
}

async fn call(
    handler: &HandlerDescriptor,
    event: &Arc<ParsedEvent>,
    store: Option<&BoxedStoreSession>,
) -> DispatchResult<()> {
    let params = resolve(handler, event, store)?;
    let snapshot = params.clone();

    let outcome = AssertUnwindSafe(async { handler.call(params).await })
        .catch_unwind()
        .await;
    let reason = match outcome {
        Ok(Ok(output)) => {
            if let Some(text) = output.filter(|t| !t.is_empty()) {
                if let Err(e) = event.reply(&text, None).await {
                    warn!(handler = %handler.id(), error = %e, "Failed to send reply");
                }
            }
            return Ok(());
        }
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };

    Err(DispatchError::HandlerExecution {
        handler: handler.id().to_string(),
        reason,
        params: format!("{snapshot:?}"),
    })
}

impl Service<Invocation> for InvokeService {
    type Response = ();
    type Error = DispatchError;
    type Future = BoxFuture<'static, DispatchResult<()>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let this = self.clone();
        let span = span!(Level::DEBUG, "invoke", handler = %invocation.handler.id());
        async move { this.invoke(&invocation.handler, invocation.event).await }
            .instrument(span)
            .boxed()
    }
}

/// Logs the outcome of a finished invocation.
pub(crate) fn log_outcome(handler: &HandlerId, result: DispatchResult<()>) {
    match result {
        Ok(()) => debug!(handler = %handler, "Handler finished"),
        Err(e) => error!(handler = %handler, error = %e, "Handler dispatch failed"),
    }
}

// =============================================================================
// SessionGuard
// =============================================================================

/// Owns a store session for the span of one invocation.
struct SessionGuard {
    session: Option<BoxedStoreSession>,
    handler: HandlerId,
}

impl SessionGuard {
    async fn open(provider: &BoxedStoreProvider, handler: &HandlerId) -> DispatchResult<Self> {
        let session = provider
            .open()
            .await
            .map_err(|e| DispatchError::store(handler, e))?;
        Ok(Self {
            session: Some(session),
            handler: handler.clone(),
        })
    }

    fn session(&self) -> Option<&BoxedStoreSession> {
        self.session.as_ref()
    }

    async fn close(mut self) -> DispatchResult<()> {
        match self.session.take() {
            Some(session) => session
                .close()
                .await
                .map_err(|e| DispatchError::store(&self.handler, e)),
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let handler = self.handler.clone();
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = session.close().await {
                        error!(handler = %handler, error = %e, "Failed to close abandoned store session");
                    }
                });
            }
            Err(_) => warn!(handler = %handler, "Store session abandoned outside a runtime"),
        }
    }
}
