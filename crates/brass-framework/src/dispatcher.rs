//! The dispatch engine.
//!
//! [`Dispatcher::dispatch_line`] is the single entry point for incoming
//! lines. For every (handler, event) pair the [`Router`] selects it:
//!
//! 1. runs the sieve pipeline and abandons the pair on a drop;
//! 2. answers an empty command invocation with usage, if the handler is
//!    documented and has autohelp enabled;
//! 3. schedules the call: ordered handlers go to their worker's queue,
//!    concurrent handlers get a tracked task gated by a concurrency limit.
//!
//! No handler code runs on the routing path.
//!
//! # Example
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::builder(registry)
//!     .max_concurrent_handlers(32)
//!     .store(Arc::new(SqliteStore::open("bot.db")?))
//!     .build();
//!
//! dispatcher.start();
//! while let Some(line) = connection.next_line().await {
//!     dispatcher.dispatch_line(connection.clone(), line).await;
//! }
//! dispatcher.shutdown(Some(Duration::from_secs(10))).await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use brass_core::{BoxedConnection, BoxedStoreProvider, ParsedEvent, RawLine};
use tower::filter::Predicate;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::{Layer, ServiceExt};
use tracing::{Instrument, Level, debug, span, trace, warn};

use crate::handler::{ConcurrencyMode, HandlerDescriptor};
use crate::invoke::{Invocation, InvokeService, log_outcome};
use crate::lifecycle::Lifecycle;
use crate::registry::HandlerRegistry;
use crate::router::Router;
use crate::sieve::{SieveCheck, SievePipeline};
use crate::worker::{WorkerRegistry, WorkerState};

/// Default cap on concurrently running `concurrent`-mode invocations.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 64;

/// Routes lines to handlers and schedules their execution.
pub struct Dispatcher {
    router: Router,
    sieves: SievePipeline,
    service: InvokeService,
    limit: GlobalConcurrencyLimitLayer,
    workers: WorkerRegistry,
    lifecycle: Lifecycle,
}

impl Dispatcher {
    /// Starts building a dispatcher over `registry`.
    pub fn builder(registry: impl Into<Arc<HandlerRegistry>>) -> DispatcherBuilder {
        DispatcherBuilder {
            registry: registry.into(),
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            store: None,
        }
    }

    /// Creates a dispatcher with default settings and no store.
    pub fn new(registry: impl Into<Arc<HandlerRegistry>>) -> Self {
        Self::builder(registry).build()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Begins accepting lines.
    pub fn start(&self) {
        self.lifecycle.start();
    }

    /// Refuses further lines and lets workers drain their queues.
    ///
    /// Each worker also gets a stop message behind the events it already holds.
    pub fn request_stop(&self) {
        self.lifecycle.request_stop();
        self.workers.stop_all();
    }

    /// Waits for in-flight invocations and workers. See [`Lifecycle::await_drained`].
    pub async fn await_drained(&self, timeout: Option<Duration>) -> bool {
        self.lifecycle.await_drained(timeout).await
    }

    /// Requests a stop and waits for the engine to drain.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        self.request_stop();
        self.await_drained(timeout).await
    }

    /// Returns `true` while lines are accepted.
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// The shared lifecycle.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Number of ordered workers created so far.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// State of `handler`'s ordered worker, if it has one.
    pub fn worker_state(&self, handler: &Arc<HandlerDescriptor>) -> Option<WorkerState> {
        self.workers.state(handler)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Routes one line received on `conn` and schedules every selected handler.
    pub async fn dispatch_line(&self, conn: BoxedConnection, line: RawLine) {
        if !self.lifecycle.is_running() {
            debug!(command = %line.command, "Dispatcher not running; line dropped");
            return;
        }

        let span = span!(Level::DEBUG, "dispatch", command = %line.command, prefix = %line.prefix);
        async {
            for route in self.router.route(conn, line) {
                self.dispatch(route.handler, route.event).await;
            }
        }
        .instrument(span)
        .await
    }

    /// Schedules `handler` for `event`, applying sieves and autohelp first.
    pub async fn dispatch(&self, handler: Arc<HandlerDescriptor>, event: ParsedEvent) {
        if !self.lifecycle.is_running() {
            debug!(handler = %handler.id(), "Dispatcher stopping; dispatch refused");
            return;
        }

        let mut check = SieveCheck::new(self.sieves.clone(), handler.clone());
        let event = match check.check(event) {
            Ok(event) => event,
            Err(_) => {
                trace!(handler = %handler.id(), "Event dropped by sieve");
                return;
            }
        };

        if handler.is_command() && handler.autohelp() && event.text.is_empty() {
            if let Some(doc) = handler.doc() {
                let usage = format!("{}{}", event.connection().config().command_prefix, doc);
                if let Err(e) = event.notice(&usage, None).await {
                    warn!(handler = %handler.id(), error = %e, "Failed to send usage");
                }
                return;
            }
        }

        let event = Arc::new(event);
        match handler.mode() {
            ConcurrencyMode::Ordered => {
                self.workers
                    .enqueue(&handler, event, &self.service, &self.lifecycle);
            }
            ConcurrencyMode::Concurrent => {
                let service = self.limit.layer(self.service.clone());
                self.lifecycle.spawn(async move {
                    let id = handler.id().clone();
                    let result = service.oneshot(Invocation { handler, event }).await;
                    log_outcome(&id, result);
                });
            }
        }
    }
}

// =============================================================================
// DispatcherBuilder
// =============================================================================

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    registry: Arc<HandlerRegistry>,
    max_concurrent_handlers: usize,
    store: Option<BoxedStoreProvider>,
}

impl DispatcherBuilder {
    /// Caps concurrently running `concurrent`-mode invocations. Values below 1 are raised to 1.
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.max_concurrent_handlers = limit.max(1);
        self
    }

    /// Sets the store that serves `db` inputs.
    pub fn store(mut self, store: BoxedStoreProvider) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the dispatcher. It must be [started](Dispatcher::start) before lines are accepted.
    pub fn build(self) -> Dispatcher {
        let service = InvokeService::new(self.store);
        // One semaphore shared by every concurrent invocation.
        let limit = GlobalConcurrencyLimitLayer::new(self.max_concurrent_handlers);

        debug!(
            commands = self.registry.command_count(),
            patterns = self.registry.patterns().len(),
            sieves = self.registry.sieves().len(),
            max_concurrent_handlers = self.max_concurrent_handlers,
            "Built dispatcher"
        );

        Dispatcher {
            sieves: self.registry.sieve_pipeline(),
            router: Router::new(self.registry),
            service,
            limit,
            workers: WorkerRegistry::new(),
            lifecycle: Lifecycle::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerBuilder;
    use crate::sieve::Sieve;
    use crate::test_support::{MemoryStore, MockConnection, Sent};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DRAIN: Option<Duration> = Some(Duration::from_secs(2));

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, function: &str) -> HandlerBuilder {
        let log = log.clone();
        let name = function.to_string();
        HandlerBuilder::new("test", function)
            .inputs(["input"])
            .handler(move |params| {
                let log = log.clone();
                let name = name.clone();
                async move {
                    let event = params.event("input").unwrap();
                    log.lock().push(format!("{name}:{}", event.text_summary()));
                    Ok(None)
                }
            })
    }

    trait Summary {
        fn text_summary(&self) -> String;
    }

    impl Summary for ParsedEvent {
        fn text_summary(&self) -> String {
            match &self.text {
                brass_core::EventText::Params(p) => p.join(" "),
                brass_core::EventText::Command(c) => format!("cmd({c})"),
                brass_core::EventText::Match(m) => format!("match({})", m.as_str()),
            }
        }
    }

    async fn run_lines(dispatcher: &Dispatcher, conn: &Arc<MockConnection>, lines: &[&str]) {
        dispatcher.start();
        for line in lines {
            dispatcher.dispatch_line(conn.clone(), line.parse().unwrap()).await;
        }
        assert!(dispatcher.shutdown(DRAIN).await);
    }

    fn sorted(log: &Log) -> Vec<String> {
        let mut entries = log.lock().clone();
        entries.sort();
        entries
    }

    #[tokio::test]
    async fn test_event_catch_all_command_and_pattern() {
        let log = Log::default();
        let mut registry = HandlerRegistry::new();
        registry.register(recorder(&log, "join").event(["JOIN"]).build().unwrap()).unwrap();
        registry.register(recorder(&log, "all").catch_all().build().unwrap()).unwrap();
        registry.register(recorder(&log, "echo").command(["echo"]).build().unwrap()).unwrap();
        registry.register(recorder(&log, "num").pattern(r"\d+").build().unwrap()).unwrap();

        let dispatcher = Dispatcher::new(registry);
        let conn = MockConnection::new("bot");
        run_lines(
            &dispatcher,
            &conn,
            &[":alice!u@h JOIN #chan", ":alice!u@h PRIVMSG #chan :.echo 42"],
        )
        .await;

        assert_eq!(
            sorted(&log),
            [
                "all:#chan",
                "all:#chan .echo 42",
                "echo:cmd(42)",
                "join:#chan",
                "num:match(42)",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_command_and_plain_channel_text() {
        let log = Log::default();
        let mut registry = HandlerRegistry::new();
        registry.register(recorder(&log, "echo").command(["echo"]).build().unwrap()).unwrap();

        let dispatcher = Dispatcher::new(registry);
        let conn = MockConnection::new("bot");
        run_lines(
            &dispatcher,
            &conn,
            &[":a!u@h PRIVMSG #c :.nope x", ":a!u@h PRIVMSG #c :echo x"],
        )
        .await;
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_sieve_drop_and_failure_block_handler() {
        let log = Log::default();
        let mut registry = HandlerRegistry::new();
        registry.register(recorder(&log, "all").catch_all().build().unwrap()).unwrap();
        registry.add_sieve(Sieve::new("s", "no_eve", |e: ParsedEvent, _: &HandlerDescriptor| {
            Ok((e.nick != "eve").then_some(e))
        }));
        registry.add_sieve(Sieve::new("s", "no_mallory", |e: ParsedEvent, _: &HandlerDescriptor| {
            if e.nick == "mallory" { Err("blocked".into()) } else { Ok(Some(e)) }
        }));

        let dispatcher = Dispatcher::new(registry);
        let conn = MockConnection::new("bot");
        run_lines(
            &dispatcher,
            &conn,
            &[
                ":eve!u@h PRIVMSG #c :one",
                ":mallory!u@h PRIVMSG #c :two",
                ":alice!u@h PRIVMSG #c :three",
            ],
        )
        .await;
        assert_eq!(sorted(&log), ["all:#c three"]);
    }

    #[tokio::test]
    async fn test_sieve_sees_target_handler_and_can_rewrite() {
        let log = Log::default();
        let mut registry = HandlerRegistry::new();
        registry.register(recorder(&log, "a").catch_all().build().unwrap()).unwrap();
        registry.register(recorder(&log, "b").catch_all().build().unwrap()).unwrap();
        registry.add_sieve(Sieve::new("s", "only_b", |mut e: ParsedEvent, h: &HandlerDescriptor| {
            if h.id().function() != "b" {
                return Ok(None);
            }
            e.text = brass_core::EventText::Params(vec!["rewritten".into()]);
            Ok(Some(e))
        }));

        let dispatcher = Dispatcher::new(registry);
        let conn = MockConnection::new("bot");
        run_lines(&dispatcher, &conn, &["PING :x"]).await;
        assert_eq!(sorted(&log), ["b:rewritten"]);
    }

    #[tokio::test]
    async fn test_autohelp_sends_usage_notice() {
        let log = Log::default();
        let mut registry = HandlerRegistry::new();
        registry
            .register(
                recorder(&log, "echo")
                    .command(["echo"])
                    .doc("echo <text> -- repeats text")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                recorder(&log, "time")
                    .command(["time"])
                    .doc("time -- shows the time")
                    .autohelp(false)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry.register(recorder(&log, "nodoc").command(["nodoc"]).build().unwrap()).unwrap();

        let dispatcher = Dispatcher::new(registry);
        let conn = MockConnection::new("bot");
        run_lines(
            &dispatcher,
            &conn,
            &[
                ":alice!u@h PRIVMSG #c :.echo   ",
                ":alice!u@h PRIVMSG #c :.time",
                ":alice!u@h PRIVMSG #c :.nodoc",
            ],
        )
        .await;

        assert_eq!(sorted(&log), ["nodoc:cmd()", "time:cmd()"]);
        assert_eq!(
            conn.sent(),
            [Sent::Raw {
                command: "NOTICE".into(),
                params: vec!["alice".into(), ".echo <text> -- repeats text".into()],
            }]
        );
    }

    #[tokio::test]
    async fn test_ordered_handler_sees_every_event_in_order() {
        let seen = Log::default();
        let sink = seen.clone();
        let mut registry = HandlerRegistry::new();
        let ordered = registry
            .register(
                HandlerBuilder::new("test", "ordered")
                    .event(["PRIVMSG"])
                    .ordered()
                    .inputs(["msg"])
                    .handler(move |params| {
                        let sink = sink.clone();
                        let msg = params.str("msg").unwrap_or_default().to_string();
                        async move {
                            tokio::time::sleep(Duration::from_millis(2)).await;
                            sink.lock().push(msg);
                            Ok(None)
                        }
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let dispatcher = Dispatcher::new(registry);
        let conn = MockConnection::new("bot");
        let lines: Vec<String> = (0..20).map(|i| format!(":a!u@h PRIVMSG #c :{i}")).collect();
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        run_lines(&dispatcher, &conn, &lines).await;

        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(*seen.lock(), expected);
        assert_eq!(dispatcher.worker_count(), 1);
        assert_eq!(
            dispatcher.worker_state(&ordered),
            Some(WorkerState::Stopped)
        );
    }

    #[tokio::test]
    async fn test_shared_id_ordered_handlers_keep_their_functions() {
        let log = Log::default();
        let tagged = |tag: &'static str| {
            let log = log.clone();
            HandlerBuilder::new("seen", "track").ordered().handler(move |_| {
                let log = log.clone();
                async move {
                    log.lock().push(tag.to_string());
                    Ok(None)
                }
            })
        };

        let mut registry = HandlerRegistry::new();
        let on_join = registry.register(tagged("join-handler").event(["JOIN"]).build().unwrap()).unwrap();
        let on_seen = registry.register(tagged("command-handler").command(["seen"]).build().unwrap()).unwrap();

        let dispatcher = Dispatcher::new(registry);
        let conn = MockConnection::new("bot");
        dispatcher.start();
        dispatcher.dispatch_line(conn.clone(), ":a!u@h JOIN #c".parse().unwrap()).await;
        dispatcher.dispatch_line(conn.clone(), ":a!u@h PRIVMSG #c :.seen bob".parse().unwrap()).await;
        assert!(dispatcher.shutdown(DRAIN).await);

        assert_eq!(sorted(&log), ["command-handler", "join-handler"]);
        assert_eq!(dispatcher.worker_count(), 2);
        assert_eq!(dispatcher.worker_state(&on_join), Some(WorkerState::Stopped));
        assert_eq!(dispatcher.worker_state(&on_seen), Some(WorkerState::Stopped));
    }

    #[tokio::test]
    async fn test_overlapping_patterns_each_invoked() {
        let log = Log::default();
        let mut registry = HandlerRegistry::new();
        registry.register(recorder(&log, "number").pattern(r"\d+").build().unwrap()).unwrap();
        registry.register(recorder(&log, "four").pattern("4").build().unwrap()).unwrap();

        let dispatcher = Dispatcher::new(registry);
        let conn = MockConnection::new("bot");
        run_lines(&dispatcher, &conn, &[":a!u@h PRIVMSG #c :room 42"]).await;

        assert_eq!(sorted(&log), ["four:match(4)", "number:match(42)"]);
    }

    #[tokio::test]
    async fn test_concurrent_handlers_respect_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let (r, p, d) = (running.clone(), peak.clone(), done.clone());

        let mut registry = HandlerRegistry::new();
        registry
            .register(
                HandlerBuilder::new("test", "slow")
                    .catch_all()
                    .handler(move |_| {
                        let (r, p, d) = (r.clone(), p.clone(), d.clone());
                        async move {
                            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                            p.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            r.fetch_sub(1, Ordering::SeqCst);
                            d.fetch_add(1, Ordering::SeqCst);
                            Ok(None)
                        }
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let dispatcher = Dispatcher::builder(registry).max_concurrent_handlers(2).build();
        let conn = MockConnection::new("bot");
        run_lines(&dispatcher, &conn, &["PING :1", "PING :2", "PING :3", "PING :4", "PING :5"]).await;

        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_reply_and_failure_paths() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(
                HandlerBuilder::new("test", "ping")
                    .command(["ping"])
                    .handler(|_| async { Ok(Some("pong".into())) })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                HandlerBuilder::new("test", "fail")
                    .command(["fail"])
                    .handler(|_| async { Err("broken".into()) })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                HandlerBuilder::new("test", "bad_input")
                    .command(["bad"])
                    .inputs(["bot"])
                    .handler(|_| async { Ok(Some("unreachable".into())) })
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let dispatcher = Dispatcher::new(registry);
        let conn = MockConnection::new("bot");
        run_lines(
            &dispatcher,
            &conn,
            &[
                ":alice!u@h PRIVMSG #c :.ping",
                ":alice!u@h PRIVMSG bot :ping",
                ":alice!u@h PRIVMSG #c :.fail",
                ":alice!u@h PRIVMSG #c :.bad",
            ],
        )
        .await;

        let mut messages = conn.messages();
        messages.sort();
        assert_eq!(
            messages,
            [
                ("#c".to_string(), "(alice) pong".to_string()),
                ("alice".to_string(), "pong".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_store_session_per_call() {
        let store = Arc::new(MemoryStore::default());
        let mut registry = HandlerRegistry::new();
        registry
            .register(
                HandlerBuilder::new("test", "db")
                    .catch_all()
                    .inputs(["db", "nick"])
                    .handler(|params| async move {
                        assert!(params.store("db").is_some());
                        if params.str("nick") == Some("bob") {
                            Err("bob breaks things".into())
                        } else {
                            Ok(None)
                        }
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let dispatcher = Dispatcher::builder(registry).store(store.clone()).build();
        let conn = MockConnection::new("bot");
        run_lines(
            &dispatcher,
            &conn,
            &[":alice!u@h PRIVMSG #c :x", ":bob!u@h PRIVMSG #c :y"],
        )
        .await;

        assert_eq!(store.opened(), 2);
        assert_eq!(store.closed(), 2);
    }

    #[tokio::test]
    async fn test_lines_refused_before_start_and_after_stop() {
        let log = Log::default();
        let mut registry = HandlerRegistry::new();
        registry.register(recorder(&log, "all").catch_all().build().unwrap()).unwrap();
        let dispatcher = Dispatcher::new(registry);
        let conn = MockConnection::new("bot");

        dispatcher.dispatch_line(conn.clone(), "PING :early".parse().unwrap()).await;
        dispatcher.start();
        dispatcher.dispatch_line(conn.clone(), "PING :on_time".parse().unwrap()).await;
        dispatcher.request_stop();
        dispatcher.dispatch_line(conn.clone(), "PING :late".parse().unwrap()).await;
        assert!(dispatcher.await_drained(DRAIN).await);

        assert_eq!(sorted(&log), ["all:on_time"]);
        assert!(!dispatcher.is_running());
    }

    #[tokio::test]
    async fn test_stop_drains_queued_ordered_events() {
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();

        let mut registry = HandlerRegistry::new();
        registry
            .register(
                HandlerBuilder::new("test", "gate")
                    .catch_all()
                    .ordered()
                    .handler(move |_| {
                        let mut release = release_rx.clone();
                        let counter = counter.clone();
                        async move {
                            let _ = release.wait_for(|open| *open).await;
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(None)
                        }
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let dispatcher = Dispatcher::new(registry);
        let conn = MockConnection::new("bot");
        dispatcher.start();
        for i in 0..3 {
            dispatcher
                .dispatch_line(conn.clone(), format!("PING :{i}").parse().unwrap())
                .await;
        }
        dispatcher.request_stop();
        release_tx.send(true).unwrap();

        assert!(dispatcher.await_drained(DRAIN).await);
        assert_eq!(handled.load(Ordering::SeqCst), 3);
    }
}
