//! Runtime wiring: configuration, logging and the dispatcher lifecycle.
//!
//! ```rust,ignore
//! use brass_runtime::BrassRuntime;
//!
//! let runtime = BrassRuntime::builder()
//!     .profile("production")
//!     .registry(registry)
//!     .store(store)
//!     .build()?;
//!
//! let dispatcher = runtime.dispatcher();
//! tokio::spawn(async move {
//!     while let Some(line) = connection.next_line().await {
//!         dispatcher.dispatch_line(connection.clone(), line).await;
//!     }
//! });
//!
//! // Until Ctrl+C or SIGTERM, then drain.
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use brass_core::{BoxedConnection, BoxedStoreProvider, RawLine};
use brass_framework::{Dispatcher, HandlerRegistry};
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{BrassConfig, ConfigLoader};
use crate::error::{LoggingError, RuntimeError, RuntimeResult};
use crate::logging;

/// A configured dispatcher plus its shutdown policy.
pub struct BrassRuntime {
    config: BrassConfig,
    dispatcher: Arc<Dispatcher>,
}

impl BrassRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Does not touch the global log subscriber.
    pub fn from_config(
        config: &BrassConfig,
        registry: impl Into<Arc<HandlerRegistry>>,
        store: Option<BoxedStoreProvider>,
    ) -> Self {
        let mut builder = Dispatcher::builder(registry)
            .max_concurrent_handlers(config.dispatch.max_concurrent_handlers);
        if let Some(store) = store {
            builder = builder.store(store);
        }

        info!(
            max_concurrent_handlers = config.dispatch.max_concurrent_handlers,
            shutdown_timeout_ms = config.dispatch.shutdown_timeout_ms,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            dispatcher: Arc::new(builder.build()),
        }
    }

    /// The loaded configuration.
    pub fn config(&self) -> &BrassConfig {
        &self.config
    }

    /// The dispatcher, for feeding lines from connection tasks.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Routes one line. Dropped unless the runtime is running.
    pub async fn dispatch_line(&self, conn: BoxedConnection, line: RawLine) {
        self.dispatcher.dispatch_line(conn, line).await;
    }

    /// Starts accepting lines.
    pub fn start(&self) {
        if self.dispatcher.is_running() {
            warn!("Runtime is already running");
            return;
        }
        self.dispatcher.start();
        info!("Runtime started");
    }

    /// Stops accepting lines and waits for in-flight handlers.
    ///
    /// Fails if handlers are still running when
    /// `dispatch.shutdown_timeout_ms` elapses.
    pub async fn stop(&self) -> RuntimeResult<()> {
        info!("Stopping Brass runtime");
        let timeout = self.config.dispatch.shutdown_timeout();
        if !self.dispatcher.shutdown(timeout).await {
            return Err(RuntimeError::ShutdownTimeout {
                timeout_ms: self.config.dispatch.shutdown_timeout_ms,
            });
        }
        info!("Runtime stopped");
        Ok(())
    }

    /// Runs until Ctrl+C or SIGTERM, then drains.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes, then drains.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start();
        shutdown.await;
        self.stop().await
    }
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C; shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`BrassRuntime`].
///
/// Loads configuration through [`ConfigLoader`] and installs the log
/// subscriber unless told otherwise.
pub struct RuntimeBuilder {
    loader: ConfigLoader,
    registry: HandlerRegistry,
    store: Option<BoxedStoreProvider>,
    init_logging: bool,
}

impl RuntimeBuilder {
    /// Creates a builder with an empty registry, no store and logging enabled.
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
            registry: HandlerRegistry::new(),
            store: None,
            init_logging: true,
        }
    }

    /// Loads exactly this configuration file.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    /// Selects the configuration profile, overriding `BRASS_PROFILE`.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    /// Adds a directory to search for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    /// Reads `BRASS_*` environment variables (the default).
    pub fn with_env(mut self) -> Self {
        self.loader = self.loader.with_env();
        self
    }

    /// Ignores environment variables.
    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Merges a configuration below files and environment variables.
    pub fn merge(mut self, config: BrassConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    /// The handlers and sieves to dispatch to.
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Store handed to handlers that declare a `db` input.
    pub fn store(mut self, store: BoxedStoreProvider) -> Self {
        self.store = Some(store);
        self
    }

    /// Whether `build` installs the global log subscriber (default: true).
    pub fn logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Loads configuration, installs logging and builds the runtime.
    ///
    /// An already installed subscriber is kept.
    pub fn build(self) -> RuntimeResult<BrassRuntime> {
        let config = self.loader.load()?;

        if self.init_logging {
            match logging::init_from_config(&config.logging) {
                Ok(()) => {}
                Err(LoggingError::Init(e)) => debug!(error = %e, "Keeping existing log subscriber"),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(BrassRuntime::from_config(&config, self.registry, self.store))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use brass_core::{Connection, ConnectionConfig, ConnectionResult};
    use brass_framework::HandlerBuilder;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct EchoConnection {
        config: ConnectionConfig,
        said: Mutex<Vec<String>>,
    }

    impl EchoConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                config: ConnectionConfig::default(),
                said: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Connection for EchoConnection {
        fn nick(&self) -> String {
            "brass".to_string()
        }

        fn server(&self) -> &str {
            "irc.test"
        }

        fn config(&self) -> &ConnectionConfig {
            &self.config
        }

        async fn send_message(&self, _target: &str, text: &str) -> ConnectionResult<()> {
            self.said.lock().push(text.to_string());
            Ok(())
        }

        async fn send_ctcp(&self, _target: &str, _kind: &str, _text: &str) -> ConnectionResult<()> {
            Ok(())
        }

        async fn send_raw(&self, _command: &str, _params: &[String]) -> ConnectionResult<()> {
            Ok(())
        }

        fn has_permission(&self, _mask: &str, _permission: &str) -> bool {
            false
        }
    }

    fn echo_registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry
            .register(
                HandlerBuilder::new("test", "echo")
                    .command(["echo"])
                    .inputs(["text"])
                    .handler(|params| async move {
                        Ok(params.text("text").and_then(|t| t.as_command()).map(str::to_string))
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
    }

    fn builder() -> RuntimeBuilder {
        BrassRuntime::builder()
            .search_path("/nonexistent/brass")
            .without_env()
            .logging(false)
    }

    #[tokio::test]
    async fn test_build_applies_dispatch_config() {
        let mut config = BrassConfig::default();
        config.dispatch.shutdown_timeout_ms = 250;

        let runtime = builder().merge(config).build().unwrap();
        assert_eq!(runtime.config().dispatch.shutdown_timeout_ms, 250);
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_profile_without_files_uses_defaults() {
        let runtime = BrassRuntime::builder()
            .profile("staging")
            .search_path("/nonexistent/brass")
            .with_env()
            .without_env()
            .logging(false)
            .build()
            .unwrap();

        assert_eq!(runtime.config().dispatch.max_concurrent_handlers, 64);
        assert!(!runtime.is_running());
        runtime.start();
        assert!(runtime.is_running());
        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_fails_build() {
        let mut config = BrassConfig::default();
        config.dispatch.max_concurrent_handlers = 0;

        let err = builder().merge(config).build().err();
        assert!(matches!(err, Some(RuntimeError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_until_dispatches_then_drains() {
        let runtime = builder().registry(echo_registry()).build().unwrap();
        let conn = EchoConnection::new();

        let dispatcher = runtime.dispatcher();
        let feeder = conn.clone();
        runtime
            .run_until(async move {
                dispatcher
                    .dispatch_line(feeder, ":al!u@h PRIVMSG #c :.echo  hello ".parse().unwrap())
                    .await;
            })
            .await
            .unwrap();

        assert!(!runtime.is_running());
        assert_eq!(*conn.said.lock(), ["(al) hello"]);

        // Refused after stop.
        runtime
            .dispatch_line(conn.clone(), ":al!u@h PRIVMSG #c :.echo again".parse().unwrap())
            .await;
        assert_eq!(conn.said.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_reports_timeout() {
        let mut config = BrassConfig::default();
        config.dispatch.shutdown_timeout_ms = 20;

        let mut registry = HandlerRegistry::new();
        registry
            .register(
                HandlerBuilder::new("test", "slow")
                    .catch_all()
                    .handler(|_| async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(None)
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let runtime = builder().merge(config).registry(registry).build().unwrap();
        runtime.start();
        runtime
            .dispatch_line(EchoConnection::new(), ":al!u@h PRIVMSG #c :hi".parse().unwrap())
            .await;

        let err = runtime.stop().await.unwrap_err();
        assert!(matches!(err, RuntimeError::ShutdownTimeout { timeout_ms: 20 }));
    }
}
