//! Ordered workers.
//!
//! A handler in [`ConcurrencyMode::Ordered`](crate::ConcurrencyMode) gets
//! exactly one [`OrderedWorker`]: an unbounded FIFO queue drained by a
//! single task, so events reach the handler one at a time in arrival order.
//!
//! ```text
//!          ┌──────── event ────────┐
//!          ▼                       │
//!  Idle ──────► Running ──────► Idle
//!   │
//!   └── Stop / cancellation (after draining the queue) ──► Stopped
//! ```
//!
//! Workers are created on first dispatch and are never recreated once stopped.
//! A worker belongs to one registered descriptor, not to a [`HandlerId`]:
//! a plugin may register the same function under several kinds.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use brass_core::ParsedEvent;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, warn};

use crate::handler::{HandlerDescriptor, HandlerId};
use crate::invoke::{Invocation, InvokeService, log_outcome};
use crate::lifecycle::Lifecycle;

/// A message on a worker's queue.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Handle this event.
    Event(Arc<ParsedEvent>),
    /// Exit once this message is reached.
    Stop,
}

/// Observable worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for the next event.
    Idle,
    /// Handling an event.
    Running,
    /// Exited; will not run again.
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Queue and task bound to one ordered handler.
#[derive(Debug)]
pub struct OrderedWorker {
    handler: HandlerId,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    state: Arc<AtomicU8>,
}

impl OrderedWorker {
    /// Spawns the worker task for `handler` on `lifecycle`.
    pub fn spawn(handler: Arc<HandlerDescriptor>, service: InvokeService, lifecycle: &Lifecycle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(WorkerState::Idle as u8));
        let id = handler.id().clone();

        debug!(handler = %id, "Spawning ordered worker");
        lifecycle.spawn(run(handler, service, rx, lifecycle.token(), state.clone()));

        Self {
            handler: id,
            tx,
            state,
        }
    }

    /// Queues an event. Returns `false` if the worker has exited.
    pub fn enqueue(&self, event: Arc<ParsedEvent>) -> bool {
        self.tx.send(WorkerMessage::Event(event)).is_ok()
    }

    /// Asks the worker to exit after the events already queued.
    pub fn stop(&self) {
        let _ = self.tx.send(WorkerMessage::Stop);
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// The handler this worker serves.
    pub fn handler(&self) -> &HandlerId {
        &self.handler
    }
}

async fn run(
    handler: Arc<HandlerDescriptor>,
    service: InvokeService,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    token: CancellationToken,
    state: Arc<AtomicU8>,
) {
    loop {
        // Queued events win over cancellation, so a stop drains the queue first.
        let message = tokio::select! {
            biased;
            message = rx.recv() => message,
            () = token.cancelled() => {
                rx.close();
                rx.recv().await
            }
        };

        let event = match message {
            Some(WorkerMessage::Event(event)) => event,
            Some(WorkerMessage::Stop) | None => break,
        };

        state.store(WorkerState::Running as u8, Ordering::SeqCst);
        let result = service
            .clone()
            .oneshot(Invocation {
                handler: handler.clone(),
                event,
            })
            .await;
        log_outcome(handler.id(), result);
        state.store(WorkerState::Idle as u8, Ordering::SeqCst);
    }

    state.store(WorkerState::Stopped as u8, Ordering::SeqCst);
    debug!(handler = %handler.id(), "Ordered worker stopped");
}

// =============================================================================
// WorkerRegistry
// =============================================================================

/// Address of a registered descriptor.
///
/// Stable for as long as the worker holds its `Arc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct WorkerKey(usize);

impl WorkerKey {
    fn of(handler: &Arc<HandlerDescriptor>) -> Self {
        Self(Arc::as_ptr(handler) as usize)
    }
}

/// All ordered workers, one per registered descriptor.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: DashMap<WorkerKey, OrderedWorker>,
}

impl WorkerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `event` on `handler`'s worker, creating the worker on first use.
    ///
    /// Creation is atomic per handler: concurrent first dispatches share one worker.
    pub fn enqueue(
        &self,
        handler: &Arc<HandlerDescriptor>,
        event: Arc<ParsedEvent>,
        service: &InvokeService,
        lifecycle: &Lifecycle,
    ) -> bool {
        let worker = self
            .workers
            .entry(WorkerKey::of(handler))
            .or_insert_with(|| OrderedWorker::spawn(handler.clone(), service.clone(), lifecycle));

        let queued = worker.enqueue(event);
        if !queued {
            warn!(handler = %handler.id(), "Ordered worker has stopped; event dropped");
        }
        queued
    }

    /// State of `handler`'s worker, if one was created.
    pub fn state(&self, handler: &Arc<HandlerDescriptor>) -> Option<WorkerState> {
        self.workers.get(&WorkerKey::of(handler)).map(|w| w.state())
    }

    /// Queues a stop behind the pending events of every worker.
    pub fn stop_all(&self) {
        for worker in self.workers.iter() {
            worker.stop();
        }
    }

    /// Number of workers created so far.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns `true` if no worker was created yet.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
